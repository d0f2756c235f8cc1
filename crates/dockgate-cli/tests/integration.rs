#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn dockgate(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("dockgate").unwrap();
    cmd.current_dir(dir.path())
        .env("DOCKGATE_ROOT", dir.path())
        .env_remove("DOCKGATE_RUNTIME")
        .env_remove("RUST_LOG");
    cmd
}

/// Executable shell script standing in for `docker`. Every invocation
/// touches `invoked` next to the script.
#[cfg(unix)]
fn fake_runtime(dir: &TempDir, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.path().join("fake-docker");
    let script = format!("#!/bin/sh\ntouch \"$(dirname \"$0\")/invoked\"\n{body}\n");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

#[cfg(unix)]
fn echo_runtime(dir: &TempDir) -> String {
    fake_runtime(dir, "echo \"$@\"")
}

fn audit_entries(dir: &TempDir) -> Vec<serde_json::Value> {
    let out = dockgate(dir).args(["audit", "--json"]).output().unwrap();
    assert!(out.status.success());
    serde_json::from_slice(&out.stdout).unwrap()
}

// ---------------------------------------------------------------------------
// dockgate init / config
// ---------------------------------------------------------------------------

#[test]
fn init_writes_config_and_gitignore() {
    let dir = TempDir::new().unwrap();
    dockgate(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created: .dockgate/config.yaml"));

    assert!(dir.path().join(".dockgate/config.yaml").exists());
    let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
    assert!(gitignore.lines().any(|l| l == ".dockgate/audit.jsonl"));
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    dockgate(&dir).arg("init").assert().success();
    dockgate(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:"));

    let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
    assert_eq!(gitignore.matches(".dockgate/audit.jsonl").count(), 1);
}

#[test]
fn config_show_prints_defaults() {
    let dir = TempDir::new().unwrap();
    dockgate(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("program: docker"))
        .stdout(predicate::str::contains("mutating_secs: 30"));
}

#[cfg(unix)]
#[test]
fn config_validate_accepts_present_runtime() {
    let dir = TempDir::new().unwrap();
    let runtime = echo_runtime(&dir);
    dockgate(&dir)
        .args(["--runtime", &runtime, "config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_fails_on_zero_timeout() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".dockgate")).unwrap();
    std::fs::write(
        dir.path().join(".dockgate/config.yaml"),
        "timeouts:\n  read_secs: 0\n",
    )
    .unwrap();
    dockgate(&dir)
        .args(["--runtime", "sh", "config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("read_secs is 0"));
}

// ---------------------------------------------------------------------------
// dockgate catalog
// ---------------------------------------------------------------------------

#[test]
fn catalog_lists_every_action() {
    let dir = TempDir::new().unwrap();
    let assert = dockgate(&dir).arg("catalog").assert().success();
    let out = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    for action in [
        "CreateApp",
        "BuildImage",
        "PullImage",
        "RunContainer",
        "StopContainer",
        "RemoveContainer",
        "ListContainers",
        "RemoveImage",
    ] {
        assert!(out.contains(action), "missing {action} in:\n{out}");
    }
}

#[test]
fn catalog_json_has_classes() {
    let dir = TempDir::new().unwrap();
    let out = dockgate(&dir).args(["catalog", "--json"]).output().unwrap();
    let actions: Vec<serde_json::Value> = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(actions.len(), 8);
    let list = actions
        .iter()
        .find(|a| a["name"] == "ListContainers")
        .unwrap();
    assert_eq!(list["class"], "safe_retry");
    assert_eq!(list["template"], "ps -a");
}

// ---------------------------------------------------------------------------
// Actions: success path
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[test]
fn run_container_sends_fixed_argv() {
    let dir = TempDir::new().unwrap();
    let runtime = echo_runtime(&dir);
    dockgate(&dir)
        .args([
            "--runtime",
            &runtime,
            "run-container",
            "--image",
            "my-flask-app",
            "--host-port",
            "8080",
            "--name",
            "c1",
        ])
        .assert()
        .code(0)
        .stdout("run -d -p 8080:5000 --name c1 my-flask-app\n");
}

#[cfg(unix)]
#[test]
fn list_containers_twice_records_two_successes() {
    let dir = TempDir::new().unwrap();
    let runtime = echo_runtime(&dir);
    for _ in 0..2 {
        dockgate(&dir)
            .args(["--runtime", &runtime, "list-containers"])
            .assert()
            .success()
            .stdout("ps -a\n");
    }

    let entries = audit_entries(&dir);
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e["outcome"] == "success"));
}

#[cfg(unix)]
#[test]
fn dispatch_reads_json_from_stdin() {
    let dir = TempDir::new().unwrap();
    let runtime = echo_runtime(&dir);
    dockgate(&dir)
        .args(["--runtime", &runtime, "dispatch", "-"])
        .write_stdin(r#"{"action":"PullImage"}"#)
        .assert()
        .success()
        .stdout("pull nginx:latest\n");
}

#[test]
fn create_app_writes_flask_scaffold() {
    let dir = TempDir::new().unwrap();
    dockgate(&dir)
        .args(["create-app", "--message", "Hello from dockgate"])
        .assert()
        .success();

    let app = std::fs::read_to_string(dir.path().join("app.py")).unwrap();
    assert!(app.contains("Hello from dockgate"));
    assert!(dir.path().join("requirements.txt").exists());
    assert!(dir.path().join("Dockerfile").exists());
}

#[cfg(unix)]
#[test]
fn json_output_reports_state() {
    let dir = TempDir::new().unwrap();
    let runtime = echo_runtime(&dir);
    let out = dockgate(&dir)
        .args(["--runtime", &runtime, "--json", "stop-container", "web"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(0));
    let result: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(result["state"], "completed");
    assert_eq!(result["outcome"], "success");
    assert_eq!(result["result"]["stdout"], "stop web\n");
}

// ---------------------------------------------------------------------------
// Actions: rejection (exit 2) and failure (exit 1)
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[test]
fn unsafe_input_is_rejected_before_runtime() {
    let dir = TempDir::new().unwrap();
    let runtime = echo_runtime(&dir);
    dockgate(&dir)
        .args(["--runtime", &runtime, "stop-container", "c1; rm -rf /"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("shell metacharacter"));

    assert!(!dir.path().join("invoked").exists());
    let entries = audit_entries(&dir);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["outcome"], "validation_failure");
}

#[cfg(unix)]
#[test]
fn unknown_action_is_rejected() {
    let dir = TempDir::new().unwrap();
    let runtime = echo_runtime(&dir);
    dockgate(&dir)
        .args([
            "--runtime",
            &runtime,
            "dispatch",
            r#"{"action":"ExecShell","params":{"cmd":"ls"}}"#,
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown action: ExecShell"));
    assert!(!dir.path().join("invoked").exists());
}

#[test]
fn non_numeric_port_is_rejected() {
    let dir = TempDir::new().unwrap();
    dockgate(&dir)
        .args([
            "run-container",
            "--image",
            "web",
            "--host-port",
            "eighty",
            "--name",
            "c1",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("hostPort"));
}

#[test]
fn malformed_dispatch_json_is_rejected() {
    let dir = TempDir::new().unwrap();
    dockgate(&dir)
        .args(["dispatch", "{not json"])
        .assert()
        .code(2);
}

#[cfg(unix)]
#[test]
fn runtime_error_exits_one() {
    let dir = TempDir::new().unwrap();
    let runtime = fake_runtime(&dir, "echo 'Error: No such container: c9' >&2; exit 1");
    dockgate(&dir)
        .args(["--runtime", &runtime, "remove-container", "c9"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No such container: c9"));

    let entries = audit_entries(&dir);
    assert_eq!(entries[0]["outcome"], "execution_failure");
}

#[test]
fn missing_runtime_exits_one() {
    let dir = TempDir::new().unwrap();
    dockgate(&dir)
        .args([
            "--runtime",
            "definitely-not-a-container-runtime",
            "list-containers",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unavailable"));
}

// ---------------------------------------------------------------------------
// --dry-run and audit filters
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[test]
fn dry_run_prints_plan_without_running() {
    let dir = TempDir::new().unwrap();
    let runtime = echo_runtime(&dir);
    dockgate(&dir)
        .args(["--runtime", &runtime, "--dry-run", "build-image", "my-flask-app"])
        .assert()
        .success()
        .stdout(predicate::str::ends_with("build -t my-flask-app .\n"));

    assert!(!dir.path().join("invoked").exists());
    assert!(!dir.path().join(".dockgate/audit.jsonl").exists());
}

#[test]
fn dry_run_rejects_invalid_request() {
    let dir = TempDir::new().unwrap();
    dockgate(&dir)
        .args(["--dry-run", "build-image", "My_App"])
        .assert()
        .code(2);
}

#[cfg(unix)]
#[test]
fn audit_filters_by_outcome_and_limit() {
    let dir = TempDir::new().unwrap();
    let runtime = echo_runtime(&dir);
    dockgate(&dir)
        .args(["--runtime", &runtime, "list-containers"])
        .assert()
        .success();
    dockgate(&dir)
        .args(["--runtime", &runtime, "stop-container", "bad|name"])
        .assert()
        .code(2);
    dockgate(&dir)
        .args(["--runtime", &runtime, "pull-image", "redis:7"])
        .assert()
        .success();

    let out = dockgate(&dir)
        .args(["audit", "--json", "--outcome", "success"])
        .output()
        .unwrap();
    let ok: Vec<serde_json::Value> = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(ok.len(), 2);

    let out = dockgate(&dir)
        .args(["audit", "--json", "--limit", "1"])
        .output()
        .unwrap();
    let last: Vec<serde_json::Value> = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(last.len(), 1);
    assert_eq!(last[0]["request"]["action"], "PullImage");

    dockgate(&dir)
        .args(["audit", "--outcome", "maybe"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown outcome"));
}

#[test]
fn audit_without_history_is_empty() {
    let dir = TempDir::new().unwrap();
    dockgate(&dir)
        .arg("audit")
        .assert()
        .success()
        .stdout(predicate::str::contains("No audit entries."));
}
