use std::{
    ffi::OsString,
    path::Path,
    sync::{Mutex, MutexGuard},
};

use httpmock::prelude::*;
use serde_json::json;
use tempfile::{tempdir, TempDir};

use hive_eval::comment_marker::append_comment_marker;
use hive_eval_runtime::{
    run_eval_bridge, CiOutputs, EvalBridgeRuntimeConfig, RepoRef, RunInputs, TriggerContext,
};

static PATH_LOCK: Mutex<()> = Mutex::new(());

/// Temp directory of stub evaluation commands prepended to `PATH`. The lock
/// serializes `PATH` mutation across tests and the previous value is restored
/// on drop, so stub commands never leak between scenarios.
struct StubCommandDir {
    _lock: MutexGuard<'static, ()>,
    previous_path: Option<OsString>,
    dir: TempDir,
}

impl StubCommandDir {
    fn install() -> Self {
        let lock = PATH_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let dir = tempdir().expect("tempdir");
        let previous_path = std::env::var_os("PATH");
        let mut paths = vec![dir.path().to_path_buf()];
        if let Some(previous) = &previous_path {
            paths.extend(std::env::split_paths(previous));
        }
        let joined = std::env::join_paths(paths).expect("PATH entries should join");
        std::env::set_var("PATH", &joined);
        Self {
            _lock: lock,
            previous_path,
            dir,
        }
    }

    fn write_stub(&self, name: &str, body: &str) {
        let path = self.dir.path().join(name);
        std::fs::write(&path, body).expect("write stub script");
        let status = std::process::Command::new("chmod")
            .arg("+x")
            .arg(&path)
            .status()
            .expect("chmod stub script");
        assert!(status.success());
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl Drop for StubCommandDir {
    fn drop(&mut self) {
        match &self.previous_path {
            Some(previous) => std::env::set_var("PATH", previous),
            None => std::env::remove_var("PATH"),
        }
    }
}

fn bridge_inputs(results_base: &str) -> RunInputs {
    RunInputs {
        run_id: "run-42".to_string(),
        project_id: "proj-7".to_string(),
        project: "demo-project".to_string(),
        api_key: "secret-key".to_string(),
        runtime: "python".to_string(),
        aggregate_function: String::new(),
        openai_api_key: String::new(),
        api_url: results_base.to_string(),
        root: String::new(),
        github_token: "gh-token".to_string(),
        step_key: "hh-eval".to_string(),
        // High enough that only the first output line triggers a progress
        // edit, keeping comment call counts deterministic.
        progress_min_interval_ms: 3_600_000,
    }
}

fn trigger_context(issue_number: Option<u64>, sha: &str) -> TriggerContext {
    TriggerContext {
        repo: RepoRef::parse("acme/widgets").expect("repo should parse"),
        sha: sha.to_string(),
        issue_number,
    }
}

fn bridge_config(
    github: &MockServer,
    results: &MockServer,
    issue_number: Option<u64>,
    outputs: CiOutputs,
) -> EvalBridgeRuntimeConfig {
    EvalBridgeRuntimeConfig {
        inputs: bridge_inputs(&results.base_url()),
        context: trigger_context(issue_number, "abc123"),
        github_api_base: github.base_url(),
        outputs,
    }
}

fn completed_result_body() -> serde_json::Value {
    json!({
        "status": "completed",
        "success": true,
        "passed": ["d1", "d2"],
        "failed": [],
        "metrics": {"accuracy": 0.95},
        "datapoints": [{"id": "d1"}]
    })
}

fn expected_outputs_file() -> &'static str {
    "status=completed\nsuccess=true\npassed=[\"d1\",\"d2\"]\nfailed=[]\nmetrics={\"accuracy\":0.95}\ndatapoints=[{\"id\":\"d1\"}]\n"
}

fn mock_marked_comment_listing(github: &MockServer, issue_number: u64, comment_id: u64) -> httpmock::Mock<'_> {
    let marked = append_comment_marker("### HoneyHive evaluation\nprevious run", "hh-eval");
    github.mock(move |when, then| {
        when.method(GET)
            .path(format!("/repos/acme/widgets/issues/{issue_number}/comments"))
            .query_param("sort", "created")
            .query_param("direction", "desc")
            .query_param("per_page", "100");
        then.status(200).json_body(json!([
            {"id": comment_id, "body": marked, "html_url": "https://example.test/comment"}
        ]));
    })
}

fn mock_result_fetch(results: &MockServer) -> httpmock::Mock<'_> {
    results.mock(|when, then| {
        when.method(GET)
            .path("/runs/run-42/result")
            .query_param("projectId", "proj-7")
            .query_param("aggregateFunction", "average");
        then.status(200).json_body(completed_result_body());
    })
}

#[tokio::test]
async fn integration_rerun_updates_single_status_comment_and_sets_outputs() {
    let stub = StubCommandDir::install();
    stub.write_stub(
        "honeyhive",
        "#!/bin/sh\n[ \"$1\" = \"eval\" ] || exit 9\necho \"evaluating with $HH_PROJECT\"\necho \"second line\"\necho \"sdk diagnostics\" >&2\n",
    );
    let github = MockServer::start();
    let results = MockServer::start();

    let list = mock_marked_comment_listing(&github, 7, 901);
    let update_running = github.mock(|when, then| {
        when.method(PATCH)
            .path("/repos/acme/widgets/issues/comments/901")
            .body_includes("Status: `running`");
        then.status(200).json_body(json!({"id": 901}));
    });
    let update_result = github.mock(|when, then| {
        when.method(PATCH)
            .path("/repos/acme/widgets/issues/comments/901")
            .body_includes("Status: `completed`")
            .body_includes("Success: `true`");
        then.status(200).json_body(json!({"id": 901}));
    });
    let create = github.mock(|when, then| {
        when.method(POST).path("/repos/acme/widgets/issues/7/comments");
        then.status(201).json_body(json!({"id": 999}));
    });
    let result_fetch = mock_result_fetch(&results);

    let output_path = stub.path().join("github-output");
    let env_path = stub.path().join("github-env");
    let config = bridge_config(
        &github,
        &results,
        Some(7),
        CiOutputs::with_paths(Some(output_path.clone()), Some(env_path.clone())),
    );
    run_eval_bridge(config)
        .await
        .expect("bridge run should succeed");

    // Start and first progress line edit the comment, then the terminal
    // report edits it once more. No new comment is ever created.
    list.assert_calls(3);
    update_running.assert_calls(2);
    update_result.assert_calls(1);
    create.assert_calls(0);
    result_fetch.assert_calls(1);

    let outputs_contents = std::fs::read_to_string(&output_path).expect("read outputs file");
    assert_eq!(outputs_contents, expected_outputs_file());
    let env_contents = std::fs::read_to_string(&env_path).expect("read env file");
    assert_eq!(env_contents, "HH_API_KEY=secret-key\nHH_PROJECT=demo-project\n");
}

#[tokio::test]
async fn integration_results_failure_posts_error_comment_and_fails_run() {
    let stub = StubCommandDir::install();
    stub.write_stub("honeyhive", "#!/bin/sh\nexit 0\n");
    let github = MockServer::start();
    let results = MockServer::start();

    mock_marked_comment_listing(&github, 7, 901);
    let update_running = github.mock(|when, then| {
        when.method(PATCH)
            .path("/repos/acme/widgets/issues/comments/901")
            .body_includes("Status: `running`");
        then.status(200).json_body(json!({"id": 901}));
    });
    let update_error = github.mock(|when, then| {
        when.method(PATCH)
            .path("/repos/acme/widgets/issues/comments/901")
            .body_includes("Status: `failed`")
            .body_includes("Error: `API request failed with status code 500`");
        then.status(200).json_body(json!({"id": 901}));
    });
    let result_fetch = results.mock(|when, then| {
        when.method(GET).path("/runs/run-42/result");
        then.status(500).body("internal error");
    });

    let output_path = stub.path().join("github-output");
    let config = bridge_config(
        &github,
        &results,
        Some(7),
        CiOutputs::with_paths(Some(output_path.clone()), None),
    );
    let error = run_eval_bridge(config)
        .await
        .expect_err("results failure should fail the run");
    assert_eq!(error.to_string(), "API request failed with status code 500");

    update_running.assert_calls(1);
    update_error.assert_calls(1);
    result_fetch.assert_calls(1);
    assert!(!output_path.exists());
}

#[tokio::test]
async fn integration_malformed_result_body_surfaces_parser_message() {
    let stub = StubCommandDir::install();
    stub.write_stub("honeyhive", "#!/bin/sh\nexit 0\n");
    let github = MockServer::start();
    let results = MockServer::start();

    mock_marked_comment_listing(&github, 7, 901);
    let update = github.mock(|when, then| {
        when.method(PATCH).path("/repos/acme/widgets/issues/comments/901");
        then.status(200).json_body(json!({"id": 901}));
    });
    let result_fetch = results.mock(|when, then| {
        when.method(GET).path("/runs/run-42/result");
        then.status(200).body("oops");
    });

    let output_path = stub.path().join("github-output");
    let config = bridge_config(
        &github,
        &results,
        Some(7),
        CiOutputs::with_paths(Some(output_path.clone()), None),
    );
    let error = run_eval_bridge(config)
        .await
        .expect_err("malformed result body should fail the run");
    assert!(
        error.to_string().contains("expected value"),
        "parser message should pass through verbatim: {error}"
    );

    // Initial progress comment plus the failure report.
    update.assert_calls(2);
    result_fetch.assert_calls(1);
    assert!(!output_path.exists());
}

#[tokio::test]
async fn integration_subprocess_failure_skips_results_and_reports_error() {
    let stub = StubCommandDir::install();
    stub.write_stub("honeyhive", "#!/bin/sh\necho \"boom imminent\"\nexit 2\n");
    let github = MockServer::start();
    let results = MockServer::start();

    mock_marked_comment_listing(&github, 7, 901);
    let update_running = github.mock(|when, then| {
        when.method(PATCH)
            .path("/repos/acme/widgets/issues/comments/901")
            .body_includes("Status: `running`");
        then.status(200).json_body(json!({"id": 901}));
    });
    let update_error = github.mock(|when, then| {
        when.method(PATCH)
            .path("/repos/acme/widgets/issues/comments/901")
            .body_includes("Error: `Command failed with exit code 2`");
        then.status(200).json_body(json!({"id": 901}));
    });
    let result_fetch = mock_result_fetch(&results);

    let output_path = stub.path().join("github-output");
    let config = bridge_config(
        &github,
        &results,
        Some(7),
        CiOutputs::with_paths(Some(output_path.clone()), None),
    );
    let error = run_eval_bridge(config)
        .await
        .expect_err("subprocess failure should fail the run");
    assert_eq!(error.to_string(), "Command failed with exit code 2");

    update_running.assert_calls(2);
    update_error.assert_calls(1);
    result_fetch.assert_calls(0);
    assert!(!output_path.exists());
}

#[tokio::test]
async fn functional_run_without_pull_request_targets_still_publishes_outputs() {
    let stub = StubCommandDir::install();
    stub.write_stub("honeyhive", "#!/bin/sh\necho \"quiet run\"\nexit 0\n");
    let github = MockServer::start();
    let results = MockServer::start();

    let lookup = github.mock(|when, then| {
        when.method(GET)
            .path("/repos/acme/widgets/commits/abc123/pulls");
        then.status(200).json_body(json!([]));
    });
    let result_fetch = mock_result_fetch(&results);

    let output_path = stub.path().join("github-output");
    let config = bridge_config(
        &github,
        &results,
        None,
        CiOutputs::with_paths(Some(output_path.clone()), None),
    );
    run_eval_bridge(config)
        .await
        .expect("run without targets should succeed");

    lookup.assert_calls(1);
    result_fetch.assert_calls(1);
    let outputs_contents = std::fs::read_to_string(&output_path).expect("read outputs file");
    assert_eq!(outputs_contents, expected_outputs_file());
}

#[tokio::test]
async fn integration_fan_out_reports_on_every_associated_pull_request() {
    let stub = StubCommandDir::install();
    stub.write_stub("honeyhive", "#!/bin/sh\nexit 0\n");
    let github = MockServer::start();
    let results = MockServer::start();

    let lookup = github.mock(|when, then| {
        when.method(GET)
            .path("/repos/acme/widgets/commits/abc123/pulls");
        then.status(200).json_body(json!([
            {"number": 3, "title": "Add parser"},
            {"number": 9, "title": "Fix cache"}
        ]));
    });
    mock_marked_comment_listing(&github, 3, 301);
    let update_first = github.mock(|when, then| {
        when.method(PATCH).path("/repos/acme/widgets/issues/comments/301");
        then.status(200).json_body(json!({"id": 301}));
    });
    let broken_list = github.mock(|when, then| {
        when.method(GET).path("/repos/acme/widgets/issues/9/comments");
        then.status(500).body("server error");
    });
    let result_fetch = mock_result_fetch(&results);

    let output_path = stub.path().join("github-output");
    let config = bridge_config(
        &github,
        &results,
        None,
        CiOutputs::with_paths(Some(output_path.clone()), None),
    );
    run_eval_bridge(config)
        .await
        .expect("one reachable pull request should be enough");

    lookup.assert_calls(1);
    // Initial and terminal upserts both reach the healthy pull request and
    // both retry the broken one.
    update_first.assert_calls(2);
    broken_list.assert_calls(2);
    result_fetch.assert_calls(1);
    let outputs_contents = std::fs::read_to_string(&output_path).expect("read outputs file");
    assert_eq!(outputs_contents, expected_outputs_file());
}

#[tokio::test]
async fn functional_node_runtime_launches_through_npx() {
    let stub = StubCommandDir::install();
    let marker_path = stub.path().join("npx-ran");
    stub.write_stub(
        "npx",
        &format!(
            "#!/bin/sh\nif [ \"$1\" = \"honeyhive\" ] && [ \"$2\" = \"eval\" ]; then\n  echo launched > {}\n  exit 0\nfi\nexit 9\n",
            marker_path.display()
        ),
    );
    let github = MockServer::start();
    let results = MockServer::start();

    github.mock(|when, then| {
        when.method(GET)
            .path("/repos/acme/widgets/commits/abc123/pulls");
        then.status(200).json_body(json!([]));
    });
    let result_fetch = mock_result_fetch(&results);

    let output_path = stub.path().join("github-output");
    let mut config = bridge_config(
        &github,
        &results,
        None,
        CiOutputs::with_paths(Some(output_path.clone()), None),
    );
    config.inputs.runtime = "node".to_string();
    run_eval_bridge(config)
        .await
        .expect("node runtime run should succeed");

    assert!(marker_path.exists(), "npx stub should have run");
    result_fetch.assert_calls(1);
    let outputs_contents = std::fs::read_to_string(&output_path).expect("read outputs file");
    assert_eq!(outputs_contents, expected_outputs_file());
}

#[tokio::test]
async fn regression_invalid_configuration_fails_before_any_reporting() {
    let output_path = std::env::temp_dir().join(format!(
        "hive-eval-unused-output-{}",
        std::process::id()
    ));
    let outputs = CiOutputs::with_paths(Some(output_path.clone()), None);

    let mut config = EvalBridgeRuntimeConfig {
        inputs: bridge_inputs("http://127.0.0.1:9"),
        context: trigger_context(Some(7), "abc123"),
        github_api_base: "http://127.0.0.1:9".to_string(),
        outputs: outputs.clone(),
    };
    config.inputs.runtime = "ruby".to_string();
    let error = run_eval_bridge(config)
        .await
        .expect_err("unsupported runtime should fail");
    assert_eq!(error.to_string(), "Unsupported runtime: ruby");

    let mut config = EvalBridgeRuntimeConfig {
        inputs: bridge_inputs("http://127.0.0.1:9"),
        context: trigger_context(Some(7), "abc123"),
        github_api_base: "http://127.0.0.1:9".to_string(),
        outputs,
    };
    config.inputs.run_id = String::new();
    let error = run_eval_bridge(config)
        .await
        .expect_err("missing run id should fail");
    assert_eq!(error.to_string(), "Input required and not supplied: runId");

    assert!(!output_path.exists(), "no outputs may be written on config errors");
}
