//! Tests for the `litecall` binary.

use assert_cmd::Command;
use std::fs;
use tempfile::TempDir;

fn litecall() -> Command {
    Command::cargo_bin("litecall").unwrap()
}

fn setup() -> (TempDir, String) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cli.db").to_string_lossy().into_owned();
    litecall()
        .args([
            path.as_str(),
            "CREATE TABLE people (name TEXT, age INTEGER); \
             INSERT INTO people VALUES ('a', 1); INSERT INTO people VALUES ('b', NULL);",
        ])
        .assert()
        .success();
    (dir, path)
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn test_prints_rows_as_text() {
    let (_dir, path) = setup();
    let out = stdout_of(litecall().args([path.as_str(), "SELECT name, age FROM people ORDER BY name"]));
    assert_eq!(out, "name=a\tage=1\nname=b\tage=NULL\n");
}

#[test]
fn test_prints_rows_as_json() {
    let (_dir, path) = setup();
    let out = stdout_of(litecall().args(["--json", path.as_str(), "SELECT name, age FROM people ORDER BY name"]));
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(
        value,
        serde_json::json!([{"name": "a", "age": "1"}, {"name": "b", "age": null}])
    );
}

#[test]
fn test_reads_sql_from_stdin() {
    let (_dir, path) = setup();
    let out = stdout_of(
        litecall()
            .arg(path.as_str())
            .write_stdin("SELECT COUNT(*) AS n FROM people"),
    );
    assert_eq!(out, "n=2\n");
}

#[test]
fn test_statement_error_exits_with_failure() {
    let (_dir, path) = setup();
    let output = litecall()
        .args([path.as_str(), "SELECT * FROM missing"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no such table: missing"));
}

#[test]
fn test_transaction_flag_rolls_back_failed_batch() {
    let (_dir, path) = setup();
    litecall()
        .args([
            "--transaction",
            "immediate",
            path.as_str(),
            "INSERT INTO people VALUES ('c', 3); INSERT INTO missing VALUES (1);",
        ])
        .assert()
        .failure();

    let out = stdout_of(litecall().args([path.as_str(), "SELECT COUNT(*) AS n FROM people"]));
    assert_eq!(out, "n=2\n");
}

#[test]
fn test_database_path_from_config() {
    let (dir, path) = setup();
    let config = dir.path().join("litecall.toml");
    fs::write(
        &config,
        format!("[database]\npath = {path:?}\n\n[transaction]\nbehavior = \"exclusive\"\n"),
    )
    .unwrap();

    let out = stdout_of(litecall().args([
        "--config",
        config.to_str().unwrap(),
        "SELECT name FROM people WHERE age = 1",
    ]));
    assert_eq!(out, "name=a\n");
}

#[test]
fn test_usage_errors() {
    litecall().arg("--bogus").assert().code(2);
    litecall().args(["--transaction", "someday"]).assert().code(2);
    litecall().arg("").write_stdin("SELECT 1").assert().code(1);
}

#[test]
fn test_version() {
    let out = stdout_of(litecall().arg("--version"));
    assert!(out.starts_with("litecall "));
    assert!(out.contains("engine 3."));
}
