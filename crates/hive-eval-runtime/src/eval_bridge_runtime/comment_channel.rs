use futures_util::future::join_all;

use hive_eval::comment_marker::{append_comment_marker, locate_marked_comment, step_comment_marker};
use hive_eval::pull_request::PullRequestRef;

use super::github_api_client::GithubApiClient;
use super::EvalBridgeError;

/// One reporting channel per bridge run: the resolved pull request targets
/// plus the step key whose marker keys the status comment on each of them.
#[derive(Clone)]
pub(super) struct CommentChannel {
    client: GithubApiClient,
    targets: Vec<PullRequestRef>,
    step_key: String,
}

impl CommentChannel {
    pub(super) fn new(
        client: GithubApiClient,
        targets: Vec<PullRequestRef>,
        step_key: String,
    ) -> Self {
        Self {
            client,
            targets,
            step_key,
        }
    }

    /// Writes `body` as the status comment on every target, editing in place
    /// when a marker match exists and creating otherwise. All targets are
    /// attempted jointly; the call fails only when no target accepted the
    /// write, so one broken sibling pull request cannot mask a delivered
    /// report.
    pub(super) async fn upsert_comment(&self, body: &str) -> Result<(), EvalBridgeError> {
        if self.targets.is_empty() {
            tracing::debug!("no pull request targets, skipping status comment");
            return Ok(());
        }
        let marker = step_comment_marker(&self.step_key);
        let keyed_body = append_comment_marker(body, &self.step_key);
        let attempts = join_all(
            self.targets
                .iter()
                .map(|target| self.upsert_on_target(target, &marker, &keyed_body)),
        )
        .await;

        let mut delivered = 0_usize;
        let mut first_error = None;
        for (target, outcome) in self.targets.iter().zip(attempts) {
            match outcome {
                Ok(()) => delivered = delivered.saturating_add(1),
                Err(error) => {
                    tracing::warn!(
                        target = %target.as_slug(),
                        "status comment upsert failed: {error}"
                    );
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
            }
        }
        match (delivered, first_error) {
            (0, Some(error)) => Err(error),
            _ => Ok(()),
        }
    }

    /// Progress-stream path: failures are logged and swallowed so a transient
    /// comment API hiccup never interrupts a healthy evaluation run.
    pub(super) async fn upsert_comment_best_effort(&self, body: &str) {
        if let Err(error) = self.upsert_comment(body).await {
            tracing::warn!("progress comment upsert failed: {error}");
        }
    }

    async fn upsert_on_target(
        &self,
        target: &PullRequestRef,
        marker: &str,
        keyed_body: &str,
    ) -> Result<(), EvalBridgeError> {
        let comments = self.client.list_pull_request_comments(target).await?;
        tracing::debug!(
            target = %target.as_slug(),
            comments = comments.len(),
            "searched pull request comments for step marker"
        );
        match locate_marked_comment(&comments, marker) {
            Some(existing) => {
                let updated = self
                    .client
                    .update_pull_request_comment(target, existing.id, keyed_body)
                    .await?;
                tracing::debug!(
                    target = %target.as_slug(),
                    comment_id = updated.id,
                    "updated status comment"
                );
            }
            None => {
                let created = self
                    .client
                    .create_pull_request_comment(target, keyed_body)
                    .await?;
                tracing::info!(
                    target = %target.as_slug(),
                    comment_id = created.id,
                    url = created.html_url.as_deref().unwrap_or_default(),
                    "created status comment"
                );
            }
        }
        Ok(())
    }
}
