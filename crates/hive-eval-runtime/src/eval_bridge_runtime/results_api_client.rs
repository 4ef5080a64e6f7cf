use hive_eval::evaluation::EvaluationResult;

use super::EvalBridgeError;

#[derive(Clone)]
pub(super) struct ResultsApiClient {
    http: reqwest::Client,
    api_base: String,
}

impl ResultsApiClient {
    pub(super) fn new(api_base: String, api_key: String) -> Result<Self, EvalBridgeError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let auth_header = format!("Bearer {}", api_key.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header).map_err(|_| {
                EvalBridgeError::Config("invalid results api authorization header".to_string())
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

    /// Fetches the terminal result for one evaluation run. Anything other
    /// than a 200 surfaces the raw status code; a 200 with a malformed body
    /// surfaces the parser's own message.
    pub(super) async fn fetch_run_result(
        &self,
        run_id: &str,
        project_id: &str,
        aggregate_function: &str,
    ) -> Result<EvaluationResult, EvalBridgeError> {
        let response = self
            .http
            .get(format!("{}/runs/{}/result", self.api_base, run_id))
            .query(&[
                ("projectId", project_id),
                ("aggregateFunction", aggregate_function),
            ])
            .send()
            .await?;
        let status = response.status();
        if status.as_u16() != 200 {
            return Err(EvalBridgeError::ResultsStatus(status.as_u16()));
        }
        let payload = response.text().await?;
        let result = serde_json::from_str::<EvaluationResult>(&payload)?;
        Ok(result)
    }
}
