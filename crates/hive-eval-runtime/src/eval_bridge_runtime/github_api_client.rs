use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use hive_eval::pull_request::{AssociatedPullRequest, PullRequestComment, PullRequestRef};
use hive_eval::report_render::truncate_for_report;

use super::{EvalBridgeError, RepoRef};

const COMMENT_PAGE_SIZE: &str = "100";

#[derive(Debug, Clone, Deserialize)]
pub(super) struct CommentWriteResponse {
    pub(super) id: u64,
    pub(super) html_url: Option<String>,
}

#[derive(Clone)]
pub(super) struct GithubApiClient {
    http: reqwest::Client,
    api_base: String,
}

impl GithubApiClient {
    pub(super) fn new(api_base: String, token: String) -> Result<Self, EvalBridgeError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("hive-eval-action"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let auth_header = format!("Bearer {}", token.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header).map_err(|_| {
                EvalBridgeError::Config("invalid github authorization header".to_string())
            })?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        Ok(Self {
            http: client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Lists the newest page of issue comments on the pull request thread.
    /// Newest-first ordering means a marker search hits the most recent
    /// status comment without walking the full history.
    pub(super) async fn list_pull_request_comments(
        &self,
        target: &PullRequestRef,
    ) -> Result<Vec<PullRequestComment>, EvalBridgeError> {
        let request = self
            .http
            .get(format!(
                "{}/repos/{}/{}/issues/{}/comments",
                self.api_base, target.owner, target.repo, target.number
            ))
            .query(&[
                ("sort", "created"),
                ("direction", "desc"),
                ("per_page", COMMENT_PAGE_SIZE),
            ]);
        self.request_json("list pull request comments", request)
            .await
    }

    pub(super) async fn create_pull_request_comment(
        &self,
        target: &PullRequestRef,
        body: &str,
    ) -> Result<CommentWriteResponse, EvalBridgeError> {
        let payload = json!({ "body": body });
        let request = self
            .http
            .post(format!(
                "{}/repos/{}/{}/issues/{}/comments",
                self.api_base, target.owner, target.repo, target.number
            ))
            .json(&payload);
        self.request_json("create pull request comment", request)
            .await
    }

    pub(super) async fn update_pull_request_comment(
        &self,
        target: &PullRequestRef,
        comment_id: u64,
        body: &str,
    ) -> Result<CommentWriteResponse, EvalBridgeError> {
        let payload = json!({ "body": body });
        let request = self
            .http
            .patch(format!(
                "{}/repos/{}/{}/issues/comments/{}",
                self.api_base, target.owner, target.repo, comment_id
            ))
            .json(&payload);
        self.request_json("update pull request comment", request)
            .await
    }

    pub(super) async fn list_pull_requests_for_commit(
        &self,
        repo: &RepoRef,
        sha: &str,
    ) -> Result<Vec<AssociatedPullRequest>, EvalBridgeError> {
        let request = self.http.get(format!(
            "{}/repos/{}/{}/commits/{}/pulls",
            self.api_base, repo.owner, repo.name, sha
        ));
        self.request_json("list pull requests for commit", request)
            .await
    }

    async fn request_json<T>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, EvalBridgeError>
    where
        T: DeserializeOwned,
    {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        let body = response.text().await.unwrap_or_default();
        Err(EvalBridgeError::GithubStatus {
            operation: operation.to_string(),
            status: status.as_u16(),
            body: truncate_for_report(&body, 800),
        })
    }
}
