mod cli_args;

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use hive_eval_runtime::{
    run_eval_bridge, CiOutputs, EvalBridgeError, EvalBridgeRuntimeConfig, TriggerContext,
};

use crate::cli_args::Cli;

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let outputs = CiOutputs::from_env();
    if let Err(error) = run(cli, outputs.clone()).await {
        outputs.set_failed(&error.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, outputs: CiOutputs) -> Result<(), EvalBridgeError> {
    let context = TriggerContext::from_env()?;
    let config = EvalBridgeRuntimeConfig {
        github_api_base: cli.github_api_base.clone(),
        inputs: cli.into_run_inputs(),
        context,
        outputs,
    };
    run_eval_bridge(config).await
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
