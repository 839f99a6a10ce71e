use assert_cmd::Command;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("canopy-etl")
        .expect("binary exists")
        .arg("--help")
        .assert()
        .success()
        .stdout(
            contains("normalize")
                .and(contains("species"))
                .and(contains("enrich"))
                .and(contains("pipeline")),
        );
}

#[test]
fn missing_data_root_fails_with_context() {
    Command::cargo_bin("canopy-etl")
        .expect("binary exists")
        .args(["normalize", "-d", "/definitely/not/a/directory"])
        .assert()
        .failure()
        .stderr(contains("is not a directory"));
}

#[test]
fn unknown_delimiter_is_rejected() {
    Command::cargo_bin("canopy-etl")
        .expect("binary exists")
        .args(["normalize", "-d", ".", "--delimiter", "ab"])
        .assert()
        .failure()
        .stderr(contains("single character"));
}
