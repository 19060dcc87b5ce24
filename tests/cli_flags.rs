use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn prints_version() {
    Command::cargo_bin("devguide-tui")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn prints_help() {
    Command::cargo_bin("devguide-tui")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("DevGuide TUI"))
        .stdout(predicate::str::contains("--route"));
}

#[test]
fn rejects_unknown_flags() {
    Command::cargo_bin("devguide-tui")
        .unwrap()
        .arg("--frobnicate")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown argument: --frobnicate"));
}

#[test]
fn config_flag_requires_a_path() {
    Command::cargo_bin("devguide-tui")
        .unwrap()
        .arg("--config")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--config needs a path"));
}
