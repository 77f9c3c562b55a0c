//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn help_lists_subcommands() {
    let mut cmd = cargo_bin_cmd!("opwatch");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("wait-server"))
        .stdout(predicate::str::contains("push"))
        .stdout(predicate::str::contains("track"));
}

#[test]
fn missing_subcommand_prints_usage() {
    let mut cmd = cargo_bin_cmd!("opwatch");
    cmd.assert().failure().stderr(predicate::str::contains("Usage"));
}

#[test]
fn wait_server_times_out_against_closed_port() {
    let mut cmd = cargo_bin_cmd!("opwatch");
    cmd.arg("wait-server")
        .env("OPWATCH_SERVER_URL", "http://127.0.0.1:1")
        .env("OPWATCH_SERVICE_MAX_ATTEMPTS", "2")
        .env("OPWATCH_SERVICE_POLL_INTERVAL_MS", "1")
        .env("RUST_LOG", "off")
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "timed out waiting for server start after 2 attempts",
        ));
}

#[test]
fn invalid_server_url_is_reported() {
    let mut cmd = cargo_bin_cmd!("opwatch");
    cmd.args(["operations", "repo"])
        .env("OPWATCH_SERVER_URL", "localhost:5001")
        .env("RUST_LOG", "off")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("OPWATCH_SERVER_URL"));
}

#[test]
fn malformed_property_is_rejected() {
    let mut cmd = cargo_bin_cmd!("opwatch");
    cmd.args(["push", "repo", "origin", "id", "--property", "novalue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected KEY=VALUE"));
}

#[test]
fn wait_ssh_timeout_includes_named_container_logs() {
    let mut cmd = cargo_bin_cmd!("opwatch");
    cmd.args(["wait-ssh", "--host", "127.0.0.1", "--port", "1"])
        .args(["--container-logs", "test-ssh"])
        .env("OPWATCH_SERVICE_MAX_ATTEMPTS", "2")
        .env("OPWATCH_SERVICE_POLL_INTERVAL_MS", "1")
        .env("OPWATCH_ENV_DOCKER_BIN", "echo")
        .env("RUST_LOG", "off")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("after 2 attempts"))
        .stderr(predicate::str::contains("logs test-ssh"));
}
