use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

#[allow(deprecated)]
fn codewarden(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("codewarden").expect("binary");
    cmd.arg("--path").arg(root).env_remove("RUST_LOG");
    cmd
}

fn run_json(root: &Path, args: &[&str]) -> (bool, Value) {
    let output = codewarden(root)
        .args(["--format", "json"])
        .args(args)
        .output()
        .expect("command run");
    let body: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    (output.status.success(), body)
}

fn setup_project() -> tempfile::TempDir {
    let temp = tempdir().unwrap();
    fs::create_dir_all(temp.path().join("src")).unwrap();
    fs::write(
        temp.path().join("src/greet.ts"),
        "function greet(name: any) {\n  console.log(name);\n  if (name == \"admin\") {\n    return true;\n  }\n  return false;\n}\n",
    )
    .unwrap();
    temp
}

#[test]
fn status_on_clean_project() {
    let temp = setup_project();
    codewarden(temp.path())
        .args(["status", "--detailed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("index: missing"))
        .stdout(predicate::str::contains("codewarden index"));
    assert!(!temp.path().join(".codewarden").exists());
}

#[test]
fn analyze_then_fix() {
    let temp = setup_project();

    let (ok, body) = run_json(temp.path(), &["analyze"]);
    assert!(ok);
    assert_eq!(body["success"], true);
    assert_eq!(body["metadata"]["issuesFound"], 3);

    codewarden(temp.path())
        .args(["fix", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would fix 3 issues in 1 files"))
        .stdout(predicate::str::contains("+function greet(name: unknown) {"));

    let (ok, body) = run_json(temp.path(), &["fix"]);
    assert!(ok);
    assert_eq!(body["metadata"]["issuesFixed"], 3);
    assert_eq!(body["metadata"]["dryRun"], false);

    let fixed = fs::read_to_string(temp.path().join("src/greet.ts")).unwrap();
    assert!(fixed.contains("name === \"admin\""));
    assert!(!fixed.contains("console.log"));

    let (ok, body) = run_json(temp.path(), &["fixes"]);
    assert!(ok);
    assert_eq!(body["metadata"]["summary"]["totalFixes"], 3);
}

#[test]
fn fix_without_analysis_fails() {
    let temp = setup_project();
    codewarden(temp.path())
        .arg("fix")
        .assert()
        .failure()
        .stderr(predicate::str::contains("fix failed"));
}

#[test]
fn search_and_history() {
    let temp = setup_project();

    codewarden(temp.path())
        .args(["search", "return false"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 1 results"))
        .stdout(predicate::str::contains("src/greet.ts:6"));

    let (ok, body) = run_json(temp.path(), &["history"]);
    assert!(ok);
    assert_eq!(body["metadata"]["queries"][0]["query"], "return false");
}

#[test]
fn empty_search_query_fails() {
    let temp = setup_project();
    codewarden(temp.path())
        .args(["search", "  "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("search failed"));
}

#[test]
fn unknown_match_type_is_rejected() {
    let temp = setup_project();
    codewarden(temp.path())
        .args(["search", "greet", "--type", "fuzzy"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown match type"));
}

#[test]
fn config_reset_and_show() {
    let temp = setup_project();
    codewarden(temp.path())
        .args(["config", "--reset"])
        .assert()
        .success();
    assert!(temp.path().join(".codewarden/config.toml").exists());

    codewarden(temp.path())
        .args(["config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[analysis]"))
        .stdout(predicate::str::contains("max_line_length = 120"));
}
