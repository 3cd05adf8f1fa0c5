#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn voxbridge() -> Command {
    let mut cmd = Command::cargo_bin("voxbridge").unwrap();
    for var in ["AGENT_PATH", "WORKSPACE_DIR", "KOKORO_TTS_PATH", "RUST_LOG"] {
        cmd.env_remove(var);
    }
    cmd
}

fn write_config(dir: &Path, json: &str) -> std::path::PathBuf {
    let path = dir.join("config.json");
    std::fs::write(&path, json).unwrap();
    path
}

#[test]
fn test_version_command() {
    voxbridge()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "voxbridge {}",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_version_flag() {
    voxbridge()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("voxbridge"));
}

#[test]
fn test_no_args_shows_help() {
    voxbridge()
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("tts-health"));
}

#[test]
fn test_unknown_command_exits_1() {
    voxbridge()
        .arg("frobnicate")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown command: frobnicate"));
}

#[test]
fn test_invalid_flag_exits_2() {
    voxbridge().arg("--no-such-flag").assert().code(2);
}

#[test]
fn test_verbose_logs_to_stderr_only() {
    voxbridge()
        .args(["--verbose", "version"])
        .assert()
        .success()
        .stdout(predicate::str::contains("DEBUG").not())
        .stderr(predicate::str::contains("DEBUG"));
}

#[test]
fn test_default_mode_hides_debug() {
    voxbridge()
        .arg("version")
        .assert()
        .success()
        .stderr(predicate::str::contains("DEBUG").not());
}

#[cfg(unix)]
#[test]
fn test_tts_health_reports_browser_fallback() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        &format!(
            r#"{{"tts_path": "{}"}}"#,
            dir.path().join("missing-kokoro").display()
        ),
    );

    voxbridge()
        .arg("tts-health")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""available": false"#))
        .stdout(predicate::str::contains(r#""provider": "browser""#));
}

#[test]
fn test_invalid_config_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), r#"{"session_timeout_minutes": 0}"#);

    voxbridge()
        .args(["ask", "hello", "--config"])
        .arg(&config)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("session_timeout_minutes"));
}

#[cfg(unix)]
#[test]
fn test_ask_runs_agent_and_prints_answer() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let agent = dir.path().join("agent");
    std::fs::write(
        &agent,
        "#!/bin/sh\nprintf '%s' '{\"type\":\"result\",\"is_error\":false,\"result\":\"42\",\"session_id\":\"c-1\"}'\n",
    )
    .unwrap();
    std::fs::set_permissions(&agent, std::fs::Permissions::from_mode(0o755)).unwrap();
    let config = write_config(
        dir.path(),
        &format!(r#"{{"agent_path": "{}"}}"#, agent.display()),
    );

    voxbridge()
        .args(["ask", "what is the answer?", "--workspace"])
        .arg(dir.path())
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("42"));
}

#[cfg(unix)]
#[test]
fn test_ask_reports_agent_failure() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let agent = dir.path().join("agent");
    std::fs::write(&agent, "#!/bin/sh\necho 'not logged in' >&2\nexit 1\n").unwrap();
    std::fs::set_permissions(&agent, std::fs::Permissions::from_mode(0o755)).unwrap();
    let config = write_config(
        dir.path(),
        &format!(
            r#"{{"agent_path": "{}", "retry": {{"enabled": false}}}}"#,
            agent.display()
        ),
    );

    voxbridge()
        .args(["ask", "hello", "--config"])
        .arg(&config)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not logged in"));
}
