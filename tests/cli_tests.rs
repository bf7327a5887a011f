//! End-to-end scenarios over the compiled `flint-note` binary, covering
//! the lettered scenarios S1-S6 (spec §8). Grounded on the teacher's
//! `tests/binary_tests.rs` (`assert_cmd::cargo::cargo_bin_cmd!` against a
//! `tempfile::tempdir` workspace).

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::{tempdir, TempDir};

fn run(dir: &TempDir, args: &[&str]) -> Value {
    let mut cmd = cargo_bin_cmd!("flint-note");
    let output = cmd
        .current_dir(dir.path())
        .args(args)
        .output()
        .expect("failed to run flint-note");
    assert!(
        output.status.success(),
        "flint-note {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout was not valid JSON")
}

fn run_fail(dir: &TempDir, args: &[&str]) -> (i32, String) {
    let mut cmd = cargo_bin_cmd!("flint-note");
    let output = cmd
        .current_dir(dir.path())
        .args(args)
        .output()
        .expect("failed to run flint-note");
    assert!(!output.status.success());
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

#[test]
fn help_flag_exits_zero() {
    let mut cmd = cargo_bin_cmd!("flint-note");
    cmd.arg("--help").assert().success();
}

#[test]
fn missing_workspace_value_reports_usage_error() {
    let mut cmd = cargo_bin_cmd!("flint-note");
    let output = cmd.arg("--workspace").output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("requires a path argument"));
}

/// S1 — FTS prefix match.
#[test]
fn fts_prefix_match_finds_programming_guide_not_cooking() {
    let dir = tempdir().unwrap();
    run(&dir, &["create", "general", "Programming Guide", "--body", "Learning Python programming"]);
    run(&dir, &["create", "general", "Cooking", "--body", "Italian cooking"]);

    let results = run(&dir, &["search", "prog"]);
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["title"], "Programming Guide");
    assert!(results[0]["snippet"].as_str().unwrap().contains("<mark>program"));
}

/// S2 — Regex fallback.
#[test]
fn regex_search_finds_note_and_rejects_bad_pattern() {
    let dir = tempdir().unwrap();
    run(&dir, &["create", "general", "Numbers", "--body", "test123 and test456"]);

    let results = run(&dir, &["search", "test\\d+", "--regex"]);
    assert_eq!(results.as_array().unwrap().len(), 1);

    let (code, stderr) = run_fail(&dir, &["search", "[bad", "--regex"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("BadQuery"));
}

/// S3 — Protected fields.
#[test]
fn update_rejects_protected_fields_and_leaves_note_untouched() {
    let dir = tempdir().unwrap();
    let note = run(&dir, &["create", "general", "Note A", "--body", "Body."]);
    let hash = note["content_hash"].as_str().unwrap();

    let (_, stderr) = run_fail(
        &dir,
        &[
            "update",
            "general/note-a",
            "--metadata",
            r#"{"title":"X","status":"done"}"#,
            "--prior-hash",
            hash,
        ],
    );
    assert!(stderr.contains("ProtectedField"));

    let fetched = run(&dir, &["get", "general/note-a"]);
    assert_eq!(fetched["title"], "Note A");
    assert!(fetched["metadata"].get("status").is_none());
}

/// S4 — Rename resolves broken links.
#[test]
fn rename_resolves_broken_links() {
    let dir = tempdir().unwrap();
    run(&dir, &["create", "general", "Source", "--body", "See [[Future Title]]."]);

    let broken = run(&dir, &["broken-links"]);
    assert_eq!(broken.as_array().unwrap().len(), 1);

    let draft = run(&dir, &["create", "projects", "Draft", "--body", "Body."]);
    let draft_hash = draft["content_hash"].as_str().unwrap();

    let report = run(
        &dir,
        &["rename", "projects/draft", "Future Title", "--prior-hash", draft_hash],
    );
    assert_eq!(report["broken_links_resolved"], 1);

    let broken_after = run(&dir, &["broken-links"]);
    assert!(broken_after.as_array().unwrap().is_empty());

    let links = run(&dir, &["links", "general/source"]);
    assert_eq!(
        links["outgoing_internal"][0]["target_id"],
        Value::String("projects/draft".to_string())
    );
}

/// S5 — Advanced filter.
#[test]
fn advanced_filter_matches_recent_draft_only() {
    let dir = tempdir().unwrap();
    run(&dir, &["create", "general", "A", "--body", "x", "--metadata", r#"{"status":"draft"}"#]);
    run(&dir, &["create", "general", "B", "--body", "x", "--metadata", r#"{"status":"published"}"#]);
    run(&dir, &["create", "general", "C", "--body", "x", "--metadata", r#"{"status":"draft"}"#]);

    let response = run(
        &dir,
        &[
            "search-advanced",
            "--filter",
            "status=draft",
            "--updated-within",
            "7d",
            "--sort",
            "updated:desc",
        ],
    );
    assert_eq!(response["total"], 2);
    assert_eq!(response["has_more"], false);
}

/// S6 — Safe-SQL rejects writes, runs aggregation.
#[test]
fn safe_sql_rejects_writes_and_runs_aggregation() {
    let dir = tempdir().unwrap();
    run(&dir, &["create", "general", "One", "--body", "x"]);
    run(&dir, &["create", "projects", "Two", "--body", "x"]);

    let (_, stderr) = run_fail(&dir, &["search-sql", "DELETE FROM notes"]);
    assert!(stderr.contains("Only SELECT"));

    let outcome = run(&dir, &["search-sql", "SELECT type, COUNT(*) c FROM notes GROUP BY type"]);
    assert_eq!(outcome["kind"], "aggregation");
    let rows = outcome["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    for row in rows {
        assert!(row.get("type").is_some());
        assert!(row.get("c").is_some());
    }
}

#[test]
fn move_note_updates_id_and_rewrites_incoming_links() {
    let dir = tempdir().unwrap();
    let target = run(&dir, &["create", "general", "Target", "--body", "Body."]);
    run(&dir, &["create", "general", "Source", "--body", "See [[general/target]]."]);
    let target_hash = target["content_hash"].as_str().unwrap();

    let report = run(&dir, &["move", "general/target", "projects", "--prior-hash", target_hash]);
    assert_eq!(report["note"]["id"], "projects/target");

    let links = run(&dir, &["links", "general/source"]);
    assert_eq!(
        links["outgoing_internal"][0]["target_id"],
        Value::String("projects/target".to_string())
    );
}

#[test]
fn delete_requires_confirm_flag() {
    let dir = tempdir().unwrap();
    let note = run(&dir, &["create", "general", "Temp", "--body", "x"]);
    let hash = note["content_hash"].as_str().unwrap();

    let (_, stderr) = run_fail(&dir, &["delete", "general/temp", "--prior-hash", hash]);
    assert!(stderr.contains("Invalid"));
}
