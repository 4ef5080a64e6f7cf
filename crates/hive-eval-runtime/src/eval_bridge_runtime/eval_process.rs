use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tokio::sync::mpsc;

use super::{io_error, EvalBridgeError, EvalRuntime};

#[derive(Debug, Clone)]
/// Fully-resolved evaluation invocation: the launcher program for the chosen
/// runtime, the directory it runs in, and the variables threaded into its
/// environment on top of the inherited one.
pub(super) struct EvalCommandSpec {
    pub(super) program: String,
    pub(super) args: Vec<String>,
    pub(super) current_dir: PathBuf,
    pub(super) env: Vec<(String, String)>,
}

impl EvalCommandSpec {
    pub(super) fn for_runtime(
        runtime: EvalRuntime,
        current_dir: PathBuf,
        env: Vec<(String, String)>,
    ) -> Self {
        let (program, args) = runtime.invocation();
        Self {
            program: program.to_string(),
            args: args.iter().map(|arg| (*arg).to_string()).collect(),
            current_dir,
            env,
        }
    }

    pub(super) fn command_line(&self) -> String {
        let mut rendered = self.program.clone();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(arg);
        }
        rendered
    }
}

/// Runs the evaluation subprocess to completion. Standard output lines are
/// forwarded through `output_tx` in arrival order from a dedicated reader
/// task, so a slow consumer never backpressures the child. Standard error is
/// logged as it arrives. The sender is dropped once the output stream ends,
/// closing the channel for the consumer.
pub(super) async fn run_eval_process(
    spec: EvalCommandSpec,
    output_tx: mpsc::UnboundedSender<String>,
) -> Result<(), EvalBridgeError> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .current_dir(&spec.current_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (name, value) in &spec.env {
        command.env(name, value);
    }

    let mut child = command.spawn().map_err(|source| EvalBridgeError::CommandSpawn {
        command: spec.command_line(),
        source,
    })?;

    let stdout_task = child
        .stdout
        .take()
        .map(|stdout| tokio::spawn(forward_stdout_lines(stdout, output_tx)));
    let stderr_task = child
        .stderr
        .take()
        .map(|stderr| tokio::spawn(log_stderr_lines(stderr)));

    let status = child
        .wait()
        .await
        .map_err(|source| io_error("failed to wait for evaluation command", source))?;
    if let Some(task) = stdout_task {
        let _ = task.await;
    }
    if let Some(task) = stderr_task {
        let _ = task.await;
    }

    match status.code() {
        Some(0) => Ok(()),
        Some(code) => Err(EvalBridgeError::CommandExit(code)),
        None => Err(EvalBridgeError::CommandSignal),
    }
}

async fn forward_stdout_lines(stdout: ChildStdout, output_tx: mpsc::UnboundedSender<String>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if output_tx.send(line).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(error) => {
                tracing::warn!("failed to read evaluation stdout: {error}");
                break;
            }
        }
    }
}

async fn log_stderr_lines(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        tracing::info!("eval: {line}");
    }
}
