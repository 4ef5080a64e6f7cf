use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::{io_error, EvalBridgeError};

#[derive(Debug, Clone, Default)]
/// Writer for the CI runner's file-based command channels: step outputs go
/// to the `GITHUB_OUTPUT` file, exported variables to `GITHUB_ENV`, and
/// failure messages to the workflow command stream on stdout.
pub struct CiOutputs {
    output_path: Option<PathBuf>,
    env_path: Option<PathBuf>,
}

impl CiOutputs {
    pub fn from_env() -> Self {
        Self {
            output_path: std::env::var_os("GITHUB_OUTPUT").map(PathBuf::from),
            env_path: std::env::var_os("GITHUB_ENV").map(PathBuf::from),
        }
    }

    pub fn with_paths(output_path: Option<PathBuf>, env_path: Option<PathBuf>) -> Self {
        Self {
            output_path,
            env_path,
        }
    }

    /// Publishes one step output. String values are written raw; everything
    /// else is serialized to compact JSON, matching how downstream steps
    /// consume structured outputs.
    pub fn set_output(&self, name: &str, value: &Value) -> Result<(), EvalBridgeError> {
        let Some(path) = &self.output_path else {
            tracing::debug!(name, "GITHUB_OUTPUT is not set, skipping step output");
            return Ok(());
        };
        append_key_value(path, name, &command_value(value))
    }

    /// Records an environment variable for later steps in the same job. The
    /// current process and its children are unaffected; callers thread the
    /// variable into spawned commands separately.
    pub fn export_variable(&self, name: &str, value: &str) -> Result<(), EvalBridgeError> {
        let Some(path) = &self.env_path else {
            tracing::debug!(name, "GITHUB_ENV is not set, skipping variable export");
            return Ok(());
        };
        append_key_value(path, name, value)
    }

    /// Emits the workflow error command carrying the failure message. The
    /// caller is responsible for the non-zero exit code.
    pub fn set_failed(&self, message: &str) {
        println!("::error::{}", escape_command_data(message));
    }
}

pub(super) fn command_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub(super) fn escape_command_data(data: &str) -> String {
    data.replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn heredoc_delimiter(value: &str) -> String {
    let mut counter = 0_u64;
    loop {
        let candidate = format!("ghadelimiter_{counter}");
        if !value.contains(&candidate) {
            return candidate;
        }
        counter = counter.saturating_add(1);
    }
}

fn append_key_value(path: &Path, name: &str, value: &str) -> Result<(), EvalBridgeError> {
    let line = if value.contains('\n') || value.contains('\r') {
        let delimiter = heredoc_delimiter(value);
        format!("{name}<<{delimiter}\n{value}\n{delimiter}\n")
    } else {
        format!("{name}={value}\n")
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| io_error(format!("failed to open {}", path.display()), source))?;
    file.write_all(line.as_bytes())
        .map_err(|source| io_error(format!("failed to write {}", path.display()), source))
}
