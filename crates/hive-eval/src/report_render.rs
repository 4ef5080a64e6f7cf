use crate::evaluation::EvaluationResult;
use serde_json::Value;

pub const REPORT_TITLE: &str = "### HoneyHive evaluation";
pub const OUTPUT_TAIL_MAX_CHARS: usize = 3_000;
const ERROR_DETAIL_MAX_CHARS: usize = 600;

pub fn truncate_for_report(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}

/// Appends one output line to the rolling tail and drops the oldest
/// characters once the tail exceeds `max_chars`. Counting is by chars so
/// trimming never lands inside a multi-byte sequence.
pub fn push_output_tail(tail: &mut String, line: &str, max_chars: usize) {
    if !tail.is_empty() {
        tail.push('\n');
    }
    tail.push_str(line);
    let excess = tail.chars().count().saturating_sub(max_chars);
    if excess > 0 {
        *tail = tail.chars().skip(excess).collect();
    }
}

/// Render the live status comment shown while the evaluation subprocess runs.
pub fn render_progress_comment(output_tail: &str) -> String {
    let mut body = format!("{REPORT_TITLE}\n\nStatus: `running`");
    let tail = output_tail.trim_end();
    if !tail.is_empty() {
        body.push_str(&format!("\n\n```\n{tail}\n```"));
    }
    body
}

/// Render the terminal status comment from the evaluation results payload.
pub fn render_result_comment(result: &EvaluationResult) -> String {
    let mut body = format!(
        "{REPORT_TITLE}\n\nStatus: `{}`\nSuccess: `{}`",
        result.status, result.success
    );
    push_list_section(&mut body, "Passed", &result.passed);
    push_list_section(&mut body, "Failed", &result.failed);
    push_json_section(&mut body, "Metrics", &result.metrics);
    push_json_section(&mut body, "Datapoints", &result.datapoints);
    body
}

/// Render the status comment posted when the bridge fails partway through.
pub fn render_error_comment(error_message: &str) -> String {
    format!(
        "{REPORT_TITLE}\n\nStatus: `failed`\n\nError: `{}`",
        truncate_for_report(error_message, ERROR_DETAIL_MAX_CHARS)
    )
}

fn push_list_section(body: &mut String, label: &str, entries: &[String]) {
    if entries.is_empty() {
        return;
    }
    body.push_str(&format!("\n\n**{label}**\n"));
    let lines = entries
        .iter()
        .map(|entry| format!("- {entry}"))
        .collect::<Vec<_>>()
        .join("\n");
    body.push_str(&lines);
}

fn push_json_section(body: &mut String, label: &str, value: &Value) {
    if value.is_null() {
        return;
    }
    let rendered = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    body.push_str(&format!("\n\n**{label}**\n```json\n{rendered}\n```"));
}
