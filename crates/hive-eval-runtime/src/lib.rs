//! Runtime crate for the HoneyHive evaluation bridge.
//!
//! Hosts the orchestration loop that runs an evaluation subprocess inside a
//! CI job, mirrors its progress onto the triggering pull request as a single
//! continuously-updated status comment, and publishes the terminal result as
//! CI outputs.

pub mod eval_bridge_runtime;

pub use eval_bridge_runtime::{
    run_eval_bridge, CiOutputs, EvalBridgeError, EvalBridgeRuntimeConfig, EvalRuntime, RepoRef,
    RunInputs, RunParameters, TriggerContext, DEFAULT_AGGREGATE_FUNCTION,
    DEFAULT_GITHUB_API_BASE, DEFAULT_PROGRESS_MIN_INTERVAL_MS, DEFAULT_RESULTS_API_BASE,
};
