use crate::pull_request::PullRequestComment;

pub const COMMENT_MARKER_PREFIX: &str = "<!-- bot_comment ";
pub const COMMENT_MARKER_SUFFIX: &str = " -->";

/// Builds the invisible HTML marker that keys one status comment per step.
pub fn step_comment_marker(step_key: &str) -> String {
    format!("{COMMENT_MARKER_PREFIX}{step_key}{COMMENT_MARKER_SUFFIX}")
}

/// Appends the step marker on its own trailing line so rendered output is
/// unaffected while later lookups can match on the raw body.
pub fn append_comment_marker(body: &str, step_key: &str) -> String {
    format!("{body}\n{}", step_comment_marker(step_key))
}

/// Returns the first comment whose body contains `marker`. Callers pass the
/// listing in newest-first order, so duplicates resolve to the most recent
/// marked comment and older strays stop receiving updates.
pub fn locate_marked_comment<'a>(
    comments: &'a [PullRequestComment],
    marker: &str,
) -> Option<&'a PullRequestComment> {
    comments.iter().find(|comment| {
        comment
            .body
            .as_deref()
            .is_some_and(|body| body.contains(marker))
    })
}
