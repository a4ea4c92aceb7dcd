//! Smoke tests for the `enrich` binary's argument surface, driven
//! through the built binary rather than the library so a misconfigured
//! `clap` attribute (a missing `--config`, a malformed subcommand) is
//! caught the way an operator would hit it.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn help_lists_every_subcommand() {
    Command::cargo_bin("enrich")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("enrich"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("history"));
}

#[test]
fn status_against_a_fresh_database_reports_zero_counters() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("fresh.db");

    Command::cargo_bin("enrich")
        .unwrap()
        .args(["--db-path", db_path.to_str().unwrap(), "status"])
        .assert()
        .success();
}

#[test]
fn enrich_without_config_or_default_file_fails_clearly() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("fresh.db");

    Command::cargo_bin("enrich")
        .unwrap()
        .args(["--db-path", db_path.to_str().unwrap(), "enrich", "--enrichments", "sentiment"])
        .env_remove("XDG_CONFIG_HOME")
        .env_remove("HOME")
        .assert()
        .failure();
}

#[test]
fn show_prompt_for_an_unknown_id_fails() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("fresh.db");

    Command::cargo_bin("enrich")
        .unwrap()
        .args(["--db-path", db_path.to_str().unwrap(), "show-prompt", "no-such-id"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no such prompt"));
}
