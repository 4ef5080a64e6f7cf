use clap::Parser;

use hive_eval_runtime::{RunInputs, DEFAULT_GITHUB_API_BASE, DEFAULT_PROGRESS_MIN_INTERVAL_MS};

/// Step inputs arrive as `INPUT_*` environment variables in CI; every flag is
/// also settable directly for local runs. Required-input validation happens
/// after parsing so missing values fail the job with the standard message
/// instead of a usage error.
#[derive(Debug, Parser)]
#[command(
    name = "hive-eval-action",
    about = "Runs a HoneyHive evaluation and reports the results on the pull request",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "INPUT_RUNID",
        default_value = "",
        help = "Evaluation run id to execute and poll for results"
    )]
    pub run_id: String,

    #[arg(
        long,
        env = "INPUT_PROJECTID",
        default_value = "",
        help = "HoneyHive project id the run belongs to"
    )]
    pub project_id: String,

    #[arg(
        long,
        env = "INPUT_PROJECT",
        default_value = "",
        help = "HoneyHive project name exported to the evaluation (defaults to the project id)"
    )]
    pub project: String,

    #[arg(
        long,
        env = "INPUT_APIKEY",
        hide_env_values = true,
        default_value = "",
        help = "HoneyHive API key"
    )]
    pub api_key: String,

    #[arg(
        long,
        env = "INPUT_RUNTIME",
        default_value = "",
        help = "Evaluation runtime: node or python"
    )]
    pub runtime: String,

    #[arg(
        long,
        env = "INPUT_AGGREGATEFUNCTION",
        default_value = "",
        help = "Aggregate function applied to run metrics (defaults to average)"
    )]
    pub aggregate_function: String,

    #[arg(
        long,
        env = "INPUT_OPENAIAPIKEY",
        hide_env_values = true,
        default_value = "",
        help = "Optional OpenAI API key forwarded to the evaluation"
    )]
    pub openai_api_key: String,

    #[arg(
        long,
        env = "INPUT_APIURL",
        default_value = "",
        help = "HoneyHive API base URL (defaults to https://api.honeyhive.ai)"
    )]
    pub api_url: String,

    #[arg(
        long,
        env = "INPUT_ROOT",
        default_value = "",
        help = "Directory the evaluation command runs in (defaults to the workspace root)"
    )]
    pub root: String,

    #[arg(
        long,
        env = "INPUT_GITHUB_TOKEN",
        hide_env_values = true,
        default_value = "",
        help = "Token used for pull request comment upserts"
    )]
    pub github_token: String,

    #[arg(
        long,
        env = "INPUT_STEP_KEY",
        default_value = "",
        help = "Step key identifying this step's status comment across reruns"
    )]
    pub step_key: String,

    #[arg(
        long,
        env = "INPUT_PROGRESS_MIN_INTERVAL_MS",
        default_value_t = DEFAULT_PROGRESS_MIN_INTERVAL_MS,
        help = "Minimum milliseconds between progress comment edits"
    )]
    pub progress_min_interval_ms: u64,

    #[arg(
        long,
        env = "GITHUB_API_URL",
        default_value = DEFAULT_GITHUB_API_BASE,
        help = "GitHub API base URL"
    )]
    pub github_api_base: String,
}

impl Cli {
    pub fn into_run_inputs(self) -> RunInputs {
        RunInputs {
            run_id: self.run_id,
            project_id: self.project_id,
            project: self.project,
            api_key: self.api_key,
            runtime: self.runtime,
            aggregate_function: self.aggregate_function,
            openai_api_key: self.openai_api_key,
            api_url: self.api_url,
            root: self.root,
            github_token: self.github_token,
            step_key: self.step_key,
            progress_min_interval_ms: self.progress_min_interval_ms,
        }
    }
}
