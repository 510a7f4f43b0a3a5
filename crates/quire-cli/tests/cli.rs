//! End-to-end tests for the `quire` binary.
//!
//! Each test writes a small JSONL event dump into an isolated temp directory
//! and runs `quire` there, so the default `.quire/index.sqlite3` lands in the
//! temp directory too.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::path::Path;
use tempfile::TempDir;

fn quire(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("quire"));
    cmd.current_dir(dir);
    cmd.env("QUIRE_LOG", "error");
    cmd.env_remove("QUIRE_INDEX_PATH");
    cmd
}

fn event(id: &str, kind: u32, tags: &[&[&str]]) -> Value {
    json!({
        "id": id,
        "pubkey": "pub",
        "created_at": 1_700_000_000,
        "kind": kind,
        "tags": tags,
        "content": "",
        "sig": "",
    })
}

/// root ─┬─ 30040:pub:child-index (childIndexId) ─── leaf-1
///       └─ abc123
fn write_events(dir: &Path) {
    let events = [
        event(
            "root",
            30040,
            &[
                &["d", "book"],
                &["title", "Book"],
                &["a", "30040:pub:child-index"],
                &["e", "abc123"],
            ],
        ),
        event("childIndexId", 30040, &[&["d", "child-index"], &["e", "leaf-1"]]),
        event("abc123", 30041, &[&["d", "my-great-tune"]]),
        event("leaf-1", 30041, &[&["d", "opening"]]),
    ];
    let body: String = events.iter().map(|e| format!("{e}\n")).collect();
    std::fs::write(dir.join("events.jsonl"), format!("# fixture\n{body}")).expect("write events");
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("quire should not crash");
    assert!(
        output.status.success(),
        "quire failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

fn indexed_project() -> TempDir {
    let dir = tempfile::tempdir().expect("temp dir");
    write_events(dir.path());
    let report = json_stdout(quire(dir.path()).args(["index", "events.jsonl", "--root", "root", "--json"]));
    assert_eq!(report["status"], "indexed");
    assert_eq!(report["events"], 4);
    dir
}

#[test]
fn index_then_toc_lists_children_in_tag_order() {
    let dir = indexed_project();

    let toc = json_stdout(quire(dir.path()).args(["toc", "root", "--json"]));
    let rows: Vec<(String, String, u64)> = toc
        .as_array()
        .expect("array")
        .iter()
        .map(|e| {
            (
                e["id"].as_str().unwrap_or_default().to_string(),
                e["title"].as_str().unwrap_or_default().to_string(),
                e["depth"].as_u64().unwrap_or_default(),
            )
        })
        .collect();

    assert_eq!(
        rows,
        vec![
            ("root".to_string(), "Book".to_string(), 0),
            ("childIndexId".to_string(), "Child Index".to_string(), 1),
            ("leaf-1".to_string(), "Opening".to_string(), 2),
            ("abc123".to_string(), "My Great Tune".to_string(), 1),
        ]
    );
}

#[test]
fn toc_human_output_is_indented() {
    let dir = indexed_project();
    quire(dir.path())
        .args(["toc", "root"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Book"))
        .stdout(predicate::str::contains("  Opening  (leaf-1)"));
}

#[test]
fn parents_reports_ordinal() {
    let dir = indexed_project();
    let parents = json_stdout(quire(dir.path()).args(["parents", "abc123", "--json"]));
    assert_eq!(
        parents,
        json!([{ "parent_id": "root", "ordinal": "0000001", "title": "Book" }])
    );
}

#[test]
fn reindexing_keeps_row_counts() {
    let dir = indexed_project();
    quire(dir.path())
        .args(["index", "events.jsonl", "--root", "30040:pub:book"])
        .assert()
        .success()
        .stdout(predicate::str::contains("indexed"));

    let stats = json_stdout(quire(dir.path()).args(["stats", "--json"]));
    assert_eq!(stats["metadata_rows"], 4);
    assert_eq!(stats["ordinal_rows"], 3);
    assert_eq!(stats["last_batch_events"], 4);
}

#[test]
fn walk_reveals_in_preorder_with_limit() {
    let dir = tempfile::tempdir().expect("temp dir");
    write_events(dir.path());

    let walk = json_stdout(quire(dir.path()).args([
        "walk",
        "events.jsonl",
        "--root",
        "root",
        "--limit",
        "3",
        "--json",
    ]));
    let keys: Vec<&str> = walk
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|e| e["key"].as_str())
        .collect();
    assert_eq!(keys, vec!["root", "30040:pub:child-index", "leaf-1"]);
}

#[test]
fn walk_seek_reports_breadcrumbs() {
    let dir = tempfile::tempdir().expect("temp dir");
    write_events(dir.path());

    let report = json_stdout(quire(dir.path()).args([
        "walk",
        "events.jsonl",
        "--root",
        "root",
        "--seek",
        "leaf-1",
        "--json",
    ]));
    assert_eq!(report["found"]["id"], "leaf-1");
    assert_eq!(report["found"]["depth"], 2);
    let path: Vec<&str> = report["path"]
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|e| e["title"].as_str())
        .collect();
    assert_eq!(path, vec!["Book", "Child Index"]);

    quire(dir.path())
        .args(["walk", "events.jsonl", "--root", "root", "--seek", "nowhere"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nowhere not found"));
}

#[test]
fn toc_without_index_fails_with_code() {
    let dir = tempfile::tempdir().expect("temp dir");
    quire(dir.path())
        .args(["toc", "root"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1001"));
}

#[test]
fn unknown_root_fails_with_code() {
    let dir = tempfile::tempdir().expect("temp dir");
    write_events(dir.path());

    let output = quire(dir.path())
        .args(["index", "events.jsonl", "--root", "missing", "--json"])
        .output()
        .expect("quire should not crash");
    assert!(!output.status.success());
    let error: Value = serde_json::from_slice(&output.stderr).expect("stderr should be JSON");
    assert_eq!(error["error"]["error_code"], "E2001");
}

#[test]
fn malformed_root_address_fails_with_code() {
    let dir = tempfile::tempdir().expect("temp dir");
    write_events(dir.path());
    quire(dir.path())
        .args(["walk", "events.jsonl", "--root", "notakind:pub:x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2003"));
}

#[test]
fn index_override_flag_is_respected() {
    let dir = tempfile::tempdir().expect("temp dir");
    write_events(dir.path());
    quire(dir.path())
        .args(["index", "events.jsonl", "--root", "root", "--index", "custom/idx.sqlite3"])
        .assert()
        .success();

    assert!(dir.path().join("custom/idx.sqlite3").exists());
    assert!(!dir.path().join(".quire/index.sqlite3").exists());
}
