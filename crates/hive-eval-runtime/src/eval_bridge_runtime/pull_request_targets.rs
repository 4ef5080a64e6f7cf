use serde_json::Value;

use hive_eval::pull_request::PullRequestRef;

use super::github_api_client::GithubApiClient;
use super::{EvalBridgeError, TriggerContext};

/// Pull request number carried by a trigger event payload, following the
/// standard precedence: `issue.number`, then `pull_request.number`, then a
/// top-level `number`. Each step falls through when the field is missing or
/// not a number.
pub(super) fn issue_number_from_event_payload(payload: &Value) -> Option<u64> {
    payload
        .get("issue")
        .and_then(|issue| issue.get("number"))
        .and_then(Value::as_u64)
        .or_else(|| {
            payload
                .get("pull_request")
                .and_then(|pull| pull.get("number"))
                .and_then(Value::as_u64)
        })
        .or_else(|| payload.get("number").and_then(Value::as_u64))
}

/// Resolves the pull requests that should receive status comments. A pull
/// request number in the trigger payload wins outright; otherwise the commit
/// under test is reverse-looked-up for associated pull requests, which may
/// legitimately yield zero or several targets.
pub(super) async fn resolve_pull_request_targets(
    client: &GithubApiClient,
    context: &TriggerContext,
) -> Result<Vec<PullRequestRef>, EvalBridgeError> {
    if let Some(number) = context.issue_number {
        tracing::debug!(number, "using pull request number from trigger payload");
        return Ok(vec![context.repo.pull_request(number)]);
    }

    let sha = context.sha.trim();
    if sha.is_empty() {
        return Err(EvalBridgeError::Config(
            "GITHUB_SHA is not set and the trigger payload carries no pull request number"
                .to_string(),
        ));
    }
    tracing::debug!(sha, "looking up pull requests associated with commit");
    let pulls = client
        .list_pull_requests_for_commit(&context.repo, sha)
        .await?;
    for pull in &pulls {
        tracing::debug!(
            number = pull.number,
            title = %pull.title,
            "pull request associated with commit"
        );
    }
    Ok(pulls
        .iter()
        .map(|pull| context.repo.pull_request(pull.number))
        .collect())
}
