//! Evaluation bridge runtime and CI reporting orchestration.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use hive_eval::evaluation::EvaluationResult;
use hive_eval::pull_request::PullRequestRef;
use hive_eval::report_render::{
    push_output_tail, render_error_comment, render_progress_comment, render_result_comment,
    OUTPUT_TAIL_MAX_CHARS,
};

mod ci_outputs;
mod comment_channel;
mod eval_process;
mod github_api_client;
mod pull_request_targets;
mod results_api_client;

pub use ci_outputs::CiOutputs;
use comment_channel::CommentChannel;
use eval_process::{run_eval_process, EvalCommandSpec};
use github_api_client::GithubApiClient;
use pull_request_targets::{issue_number_from_event_payload, resolve_pull_request_targets};
use results_api_client::ResultsApiClient;

pub const DEFAULT_RESULTS_API_BASE: &str = "https://api.honeyhive.ai";
pub const DEFAULT_AGGREGATE_FUNCTION: &str = "average";
pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_PROGRESS_MIN_INTERVAL_MS: u64 = 3_000;
const DEFAULT_EVAL_ROOT: &str = ".";

#[derive(Debug, Error)]
/// Failure cases surfaced by the evaluation bridge runtime. Display strings
/// double as the CI job failure message, so variants that reach users keep
/// the wording stable.
pub enum EvalBridgeError {
    #[error("{0}")]
    Config(String),
    #[error("failed to spawn evaluation command '{command}': {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Command failed with exit code {0}")]
    CommandExit(i32),
    #[error("Command terminated by signal")]
    CommandSignal,
    #[error("API request failed with status code {0}")]
    ResultsStatus(u16),
    #[error("github api {operation} failed with status {status}: {body}")]
    GithubStatus {
        operation: String,
        status: u16,
        body: String,
    },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Parse(#[from] serde_json::Error),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

pub(crate) fn io_error(context: impl Into<String>, source: std::io::Error) -> EvalBridgeError {
    EvalBridgeError::Io {
        context: context.into(),
        source,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Repository coordinates taken from the CI trigger environment.
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn parse(raw: &str) -> Result<Self, EvalBridgeError> {
        let trimmed = raw.trim();
        let Some((owner, name)) = trimmed.split_once('/') else {
            return Err(EvalBridgeError::Config(format!(
                "invalid GITHUB_REPOSITORY '{raw}', expected owner/repo"
            )));
        };
        let owner = owner.trim();
        let name = name.trim();
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(EvalBridgeError::Config(format!(
                "invalid GITHUB_REPOSITORY '{raw}', expected owner/repo"
            )));
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn as_slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn pull_request(&self, number: u64) -> PullRequestRef {
        PullRequestRef {
            owner: self.owner.clone(),
            repo: self.name.clone(),
            number,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `EvalRuntime` values for the evaluation subprocess.
pub enum EvalRuntime {
    Node,
    Python,
}

impl EvalRuntime {
    pub fn parse(raw: &str) -> Result<Self, EvalBridgeError> {
        match raw.trim() {
            "node" => Ok(Self::Node),
            "python" => Ok(Self::Python),
            other => Err(EvalBridgeError::Config(format!(
                "Unsupported runtime: {other}"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Python => "python",
        }
    }

    /// Fixed launcher invocation for each runtime. Node projects go through
    /// `npx` so the locally-installed CLI is used; Python installs expose the
    /// `honeyhive` entry point directly.
    fn invocation(self) -> (&'static str, &'static [&'static str]) {
        match self {
            Self::Node => ("npx", &["honeyhive", "eval"]),
            Self::Python => ("honeyhive", &["eval"]),
        }
    }
}

#[derive(Debug, Clone, Default)]
/// Raw input strings collected from the CI step configuration before
/// validation. Empty strings stand in for inputs the step never set.
pub struct RunInputs {
    pub run_id: String,
    pub project_id: String,
    pub project: String,
    pub api_key: String,
    pub runtime: String,
    pub aggregate_function: String,
    pub openai_api_key: String,
    pub api_url: String,
    pub root: String,
    pub github_token: String,
    pub step_key: String,
    pub progress_min_interval_ms: u64,
}

#[derive(Debug, Clone)]
/// Validated run configuration. Construction via [`RunParameters::from_inputs`]
/// is the only path, so every consumer downstream can rely on the invariants:
/// required fields are non-empty, the runtime is supported, and defaults are
/// applied.
pub struct RunParameters {
    pub run_id: String,
    pub project_id: String,
    /// Project name exported to the evaluation as `HH_PROJECT`; falls back to
    /// the project id when the step only supplies one of the two.
    pub project: String,
    pub api_key: String,
    pub runtime: EvalRuntime,
    pub aggregate_function: String,
    pub openai_api_key: Option<String>,
    pub api_url: String,
    pub root: PathBuf,
    pub github_token: String,
    pub step_key: String,
    pub progress_min_interval: Duration,
}

impl RunParameters {
    pub fn from_inputs(inputs: &RunInputs) -> Result<Self, EvalBridgeError> {
        let run_id = required_input("runId", &inputs.run_id)?;
        let project_id = required_input("projectId", &inputs.project_id)?;
        let api_key = required_input("apiKey", &inputs.api_key)?;
        let github_token = required_input("github_token", &inputs.github_token)?;
        let step_key = required_input("step_key", &inputs.step_key)?;
        let runtime = EvalRuntime::parse(&inputs.runtime)?;
        let project = non_empty_or(&inputs.project, &project_id);
        let aggregate_function =
            non_empty_or(&inputs.aggregate_function, DEFAULT_AGGREGATE_FUNCTION);
        let api_url = non_empty_or(&inputs.api_url, DEFAULT_RESULTS_API_BASE)
            .trim_end_matches('/')
            .to_string();
        let root = PathBuf::from(non_empty_or(&inputs.root, DEFAULT_EVAL_ROOT));
        let openai_api_key = match inputs.openai_api_key.trim() {
            "" => None,
            value => Some(value.to_string()),
        };
        Ok(Self {
            run_id,
            project_id,
            project,
            api_key,
            runtime,
            aggregate_function,
            openai_api_key,
            api_url,
            root,
            github_token,
            step_key,
            progress_min_interval: Duration::from_millis(inputs.progress_min_interval_ms),
        })
    }
}

fn required_input(name: &str, value: &str) -> Result<String, EvalBridgeError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EvalBridgeError::Config(format!(
            "Input required and not supplied: {name}"
        )));
    }
    Ok(trimmed.to_string())
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Clone)]
/// Trigger metadata for the CI run: the repository, the commit under test,
/// and the pull request number when the trigger event carried one directly.
pub struct TriggerContext {
    pub repo: RepoRef,
    pub sha: String,
    pub issue_number: Option<u64>,
}

impl TriggerContext {
    /// Reads the standard CI trigger environment. The event payload file is
    /// optional; when it is missing or unreadable the pull request number is
    /// resolved later through the commit-association lookup.
    pub fn from_env() -> Result<Self, EvalBridgeError> {
        let repository = std::env::var("GITHUB_REPOSITORY")
            .map_err(|_| EvalBridgeError::Config("GITHUB_REPOSITORY is not set".to_string()))?;
        let repo = RepoRef::parse(&repository)?;
        let sha = std::env::var("GITHUB_SHA").unwrap_or_default();
        let issue_number = std::env::var("GITHUB_EVENT_PATH")
            .ok()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|payload| serde_json::from_str::<Value>(&payload).ok())
            .as_ref()
            .and_then(issue_number_from_event_payload);
        Ok(Self {
            repo,
            sha,
            issue_number,
        })
    }
}

#[derive(Debug, Clone)]
/// Runtime configuration for one evaluation bridge invocation.
pub struct EvalBridgeRuntimeConfig {
    pub inputs: RunInputs,
    pub context: TriggerContext,
    pub github_api_base: String,
    pub outputs: CiOutputs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BridgePhase {
    Starting,
    Running,
    Reporting,
    Done,
    Failed,
}

impl BridgePhase {
    fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Reporting => "reporting",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

fn advance_phase(phase: &mut BridgePhase, next: BridgePhase) {
    *phase = next;
    tracing::info!(phase = next.as_str(), "evaluation bridge phase");
}

/// Coalesces live comment edits: the first pending update goes out
/// immediately, later ones wait until `min_interval` has elapsed since the
/// last edit so chatty evaluations do not hammer the comment API.
struct ProgressThrottle {
    min_interval: Duration,
    last_update: Option<Instant>,
}

impl ProgressThrottle {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_update: None,
        }
    }

    fn ready(&mut self) -> bool {
        let now = Instant::now();
        let due = self
            .last_update
            .map_or(true, |last| now.duration_since(last) >= self.min_interval);
        if due {
            self.last_update = Some(now);
        }
        due
    }
}

/// Public entry for the evaluation bridge: validates the run configuration,
/// executes the evaluation subprocess with live pull-request status updates,
/// polls the results API, and publishes the terminal report.
///
/// Every failure funnels through here exactly once: the error is posted onto
/// the status comment when the comment channel was already established, then
/// returned unchanged so the caller can mark the CI job failed with the same
/// message.
pub async fn run_eval_bridge(config: EvalBridgeRuntimeConfig) -> Result<(), EvalBridgeError> {
    let mut channel = None;
    let outcome = execute_eval_bridge(config, &mut channel).await;
    if let Err(error) = &outcome {
        tracing::error!(
            phase = BridgePhase::Failed.as_str(),
            "evaluation bridge failed: {error}"
        );
        match channel.as_ref() {
            Some(channel) => {
                channel
                    .upsert_comment_best_effort(&render_error_comment(&error.to_string()))
                    .await;
            }
            None => {
                tracing::debug!("failure preceded comment channel setup, skipping error comment");
            }
        }
    }
    outcome
}

async fn execute_eval_bridge(
    config: EvalBridgeRuntimeConfig,
    channel_slot: &mut Option<CommentChannel>,
) -> Result<(), EvalBridgeError> {
    let EvalBridgeRuntimeConfig {
        inputs,
        context,
        github_api_base,
        outputs,
    } = config;
    let mut phase = BridgePhase::Starting;
    tracing::info!(
        phase = phase.as_str(),
        repo = %context.repo.as_slug(),
        "evaluation bridge starting"
    );

    let params = RunParameters::from_inputs(&inputs)?;
    let github = GithubApiClient::new(github_api_base, params.github_token.clone())?;
    let targets = resolve_pull_request_targets(&github, &context).await?;
    if targets.is_empty() {
        tracing::warn!(
            sha = %context.sha,
            "no pull requests found for trigger, status comments will be skipped"
        );
    }
    let channel = &*channel_slot.insert(CommentChannel::new(
        github,
        targets,
        params.step_key.clone(),
    ));
    channel.upsert_comment(&render_progress_comment("")).await?;

    advance_phase(&mut phase, BridgePhase::Running);
    let environment = eval_environment(&params);
    for (name, value) in &environment {
        outputs.export_variable(name, value)?;
    }
    let spec = EvalCommandSpec::for_runtime(params.runtime, params.root.clone(), environment);
    tracing::info!(
        runtime = params.runtime.as_str(),
        command = %spec.command_line(),
        root = %params.root.display(),
        "launching evaluation"
    );
    let (output_tx, mut output_rx) = mpsc::unbounded_channel();
    let process = run_eval_process(spec, output_tx);
    let mut tail = String::new();
    let mut throttle = ProgressThrottle::new(params.progress_min_interval);
    let stream_updates = async {
        while let Some(line) = output_rx.recv().await {
            push_output_tail(&mut tail, &line, OUTPUT_TAIL_MAX_CHARS);
            if throttle.ready() {
                channel
                    .upsert_comment_best_effort(&render_progress_comment(&tail))
                    .await;
            }
        }
    };
    let (process_outcome, ()) = tokio::join!(process, stream_updates);
    process_outcome?;

    advance_phase(&mut phase, BridgePhase::Reporting);
    let results = ResultsApiClient::new(params.api_url.clone(), params.api_key.clone())?;
    let result = results
        .fetch_run_result(&params.run_id, &params.project_id, &params.aggregate_function)
        .await?;
    log_result_summary(&result);
    channel.upsert_comment(&render_result_comment(&result)).await?;
    set_result_outputs(&outputs, &result)?;

    advance_phase(&mut phase, BridgePhase::Done);
    Ok(())
}

/// Environment threaded into the evaluation subprocess (and exported for
/// later job steps). `OPENAI_API_KEY` is only forwarded when the job
/// environment does not already define one.
fn eval_environment(params: &RunParameters) -> Vec<(String, String)> {
    let ambient_openai_key = std::env::var_os("OPENAI_API_KEY").is_some();
    eval_environment_with_ambient(params, ambient_openai_key)
}

fn eval_environment_with_ambient(
    params: &RunParameters,
    ambient_openai_key: bool,
) -> Vec<(String, String)> {
    let mut environment = vec![
        ("HH_API_KEY".to_string(), params.api_key.clone()),
        ("HH_PROJECT".to_string(), params.project.clone()),
    ];
    if let Some(openai_api_key) = &params.openai_api_key {
        if !ambient_openai_key {
            environment.push(("OPENAI_API_KEY".to_string(), openai_api_key.clone()));
        }
    }
    environment
}

fn pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn log_result_summary(result: &EvaluationResult) {
    let passed = serde_json::to_value(&result.passed).unwrap_or(Value::Null);
    let failed = serde_json::to_value(&result.failed).unwrap_or(Value::Null);
    tracing::info!(
        status = %result.status,
        success = result.success,
        "evaluation run result received"
    );
    tracing::info!("passed: {}", pretty_json(&passed));
    tracing::info!("failed: {}", pretty_json(&failed));
    tracing::info!("metrics: {}", pretty_json(&result.metrics));
    tracing::info!("datapoints: {}", pretty_json(&result.datapoints));
}

fn set_result_outputs(
    outputs: &CiOutputs,
    result: &EvaluationResult,
) -> Result<(), EvalBridgeError> {
    outputs.set_output("status", &Value::String(result.status.clone()))?;
    outputs.set_output("success", &Value::Bool(result.success))?;
    outputs.set_output("passed", &serde_json::to_value(&result.passed)?)?;
    outputs.set_output("failed", &serde_json::to_value(&result.failed)?)?;
    outputs.set_output("metrics", &result.metrics)?;
    outputs.set_output("datapoints", &result.datapoints)?;
    Ok(())
}
