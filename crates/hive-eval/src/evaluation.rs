use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize, Serialize)]
/// Terminal payload returned by the evaluation results API for one run.
/// Fields map one-to-one onto the CI outputs surfaced by the action.
pub struct EvaluationResult {
    pub status: String,
    pub success: bool,
    #[serde(default)]
    pub passed: Vec<String>,
    #[serde(default)]
    pub failed: Vec<String>,
    #[serde(default)]
    pub metrics: Value,
    #[serde(default)]
    pub datapoints: Value,
}
