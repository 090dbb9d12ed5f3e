use assert_cmd::Command;
use predicates::prelude::*;

fn proxy() -> Command {
    let mut cmd = Command::cargo_bin("webcompat-proxy").unwrap();
    cmd.env_clear();
    cmd
}

#[test]
fn prints_version() {
    proxy()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("webcompat-proxy "));
}

#[test]
fn check_config_reports_repositories() {
    proxy()
        .env("WEBCOMPAT_BOT_TOKEN", "t")
        .env("WEBCOMPAT_ISSUES_REPO", "org/repo/issues")
        .args(["--log-level", "warn", "--check-config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("issues=org/repo/issues"));
}

#[test]
fn missing_bot_token_fails() {
    proxy()
        .arg("--check-config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("WEBCOMPAT_BOT_TOKEN"));
}

#[test]
fn malformed_statuses_fail() {
    proxy()
        .env("WEBCOMPAT_BOT_TOKEN", "t")
        .env("WEBCOMPAT_STATUSES", "[1,2]")
        .arg("--check-config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("WEBCOMPAT_STATUSES"));
}
