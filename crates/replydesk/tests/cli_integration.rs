//! CLI integration tests for the replydesk command-line interface.
//!
//! These tests cover argument parsing, the follow-up tracker end to end, and
//! knowledge indexing with the mock embedder. Nothing here talks to a
//! completion backend or a mailbox.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A replydesk command isolated from the user's config, data and env.
fn replydesk(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("replydesk").unwrap();
    cmd.current_dir(home)
        .env("REPLYDESK_CONFIG_DIR", home.join("config"))
        .env("REPLYDESK_DATA_DIR", home.join("data"))
        .env_remove("REPLYDESK_VECTOR_PATH")
        .env_remove("REPLYDESK_DOCS_DIR")
        .env_remove("AZURE_CLIENT_ID")
        .env_remove("AZURE_TENANT_ID");
    cmd
}

fn json(output: &[u8]) -> serde_json::Value {
    serde_json::from_slice(output).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_displays() {
    let home = TempDir::new().unwrap();
    replydesk(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("replydesk"))
        .stdout(predicate::str::contains("follow-up"));
}

#[test]
fn test_version_displays() {
    let home = TempDir::new().unwrap();
    replydesk(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("replydesk"));
}

#[test]
fn test_help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    replydesk(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ingest"))
        .stdout(predicate::str::contains("search"))
        .stdout(predicate::str::contains("draft"))
        .stdout(predicate::str::contains("auth"))
        .stdout(predicate::str::contains("inbox"))
        .stdout(predicate::str::contains("reply"))
        .stdout(predicate::str::contains("followup"));
}

#[test]
fn test_followup_help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    replydesk(home.path())
        .args(["followup", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("add"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("resolve"))
        .stdout(predicate::str::contains("escalate"))
        .stdout(predicate::str::contains("stats"))
        .stdout(predicate::str::contains("sql"));
}

#[test]
fn test_unknown_subcommand_fails() {
    let home = TempDir::new().unwrap();
    replydesk(home.path())
        .arg("frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_reply_requires_message_id() {
    let home = TempDir::new().unwrap();
    replydesk(home.path())
        .arg("reply")
        .assert()
        .failure()
        .stderr(predicate::str::contains("MESSAGE_ID"));
}

#[test]
fn test_invalid_priority_rejected() {
    let home = TempDir::new().unwrap();
    replydesk(home.path())
        .args([
            "followup", "add", "--subject", "x", "--sender", "a@b.com", "--priority", "P9",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("P9"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Follow-up Tracker
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_followup_lifecycle() {
    let home = TempDir::new().unwrap();

    let out = replydesk(home.path())
        .args([
            "--json",
            "followup",
            "add",
            "--subject",
            "SFTP login failing",
            "--sender",
            "ops@acme.com",
            "--summary",
            "Asked for the client IP",
            "--priority",
            "P1",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let row = json(&out);
    assert_eq!(row["priority"], "P1");
    assert_eq!(row["status"], "Pending");
    let id = row["id"].as_i64().unwrap().to_string();

    replydesk(home.path())
        .args(["followup", "list", "--filter", "pending"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SFTP login failing"))
        .stdout(predicate::str::contains("P1 - Production Down"));

    replydesk(home.path())
        .args(["followup", "resolve", &id, "--notes", "Customer confirmed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("marked Resolved"));

    replydesk(home.path())
        .args(["followup", "list", "--filter", "pending"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No follow-ups"));

    let out = replydesk(home.path())
        .args(["--json", "followup", "stats"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stats = json(&out);
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["resolved"], 1);
    assert_eq!(stats["pending"], 0);

    replydesk(home.path())
        .args(["followup", "delete", &id])
        .assert()
        .success();
    replydesk(home.path())
        .args(["followup", "delete", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_followup_note_keeps_status() {
    let home = TempDir::new().unwrap();
    replydesk(home.path())
        .args(["followup", "add", "--subject", "AS2 MDN missing", "--sender", "edi@globex.com"])
        .assert()
        .success();

    replydesk(home.path())
        .args(["followup", "escalate", "1"])
        .assert()
        .success();
    replydesk(home.path())
        .args(["followup", "note", "1", "Vendor ticket opened"])
        .assert()
        .success();

    let out = replydesk(home.path())
        .args(["--json", "followup", "list"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let rows = json(&out);
    let row = &rows[0]["follow_up"];
    assert_eq!(row["status"], "Escalated");
    assert_eq!(row["notes"], "Vendor ticket opened");
    assert_eq!(rows[0]["indicator"], "alert");
}

#[test]
fn test_followup_status_reopens_and_keeps_notes() {
    let home = TempDir::new().unwrap();
    replydesk(home.path())
        .args(["followup", "add", "--subject", "Cert expiry", "--sender", "a@b.com"])
        .assert()
        .success();
    replydesk(home.path())
        .args(["followup", "resolve", "1", "--notes", "Renewed"])
        .assert()
        .success();

    replydesk(home.path())
        .args(["followup", "status", "1", "pending"])
        .assert()
        .success()
        .stdout(predicate::str::contains("marked Pending"));

    let out = replydesk(home.path())
        .args(["--json", "followup", "list", "--filter", "pending"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let rows = json(&out);
    assert_eq!(rows[0]["follow_up"]["status"], "Pending");
    assert_eq!(rows[0]["follow_up"]["notes"], "Renewed");

    replydesk(home.path())
        .args(["followup", "status", "1", "closed"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("closed"));
}

#[test]
fn test_sql_console_reads() {
    let home = TempDir::new().unwrap();
    replydesk(home.path())
        .args(["followup", "add", "--subject", "Cert expiry", "--sender", "a@b.com"])
        .assert()
        .success();

    let out = replydesk(home.path())
        .args(["--json", "followup", "sql", "SELECT subject, priority FROM followups"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let result = json(&out);
    assert_eq!(result["columns"][0], "subject");
    assert_eq!(result["rows"][0][0], "Cert expiry");
    assert_eq!(result["rows"][0][1], "P3 - Non-critical");
}

#[test]
fn test_sql_console_rejects_writes() {
    let home = TempDir::new().unwrap();
    replydesk(home.path())
        .args(["followup", "add", "--subject", "Keep me", "--sender", "a@b.com"])
        .assert()
        .success();

    replydesk(home.path())
        .args(["followup", "sql", "DELETE FROM followups"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("read-only"));
    replydesk(home.path())
        .args(["followup", "sql", "BEGIN"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("read-only"));

    replydesk(home.path())
        .args(["followup", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Keep me"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Knowledge
// ─────────────────────────────────────────────────────────────────────────────

fn mock_embeddings(home: &Path) {
    std::fs::write(
        home.join("replydesk.toml"),
        "[embedding]\nprovider = \"mock\"\n",
    )
    .unwrap();
}

#[test]
fn test_ingest_is_idempotent() {
    let home = TempDir::new().unwrap();
    mock_embeddings(home.path());
    std::fs::create_dir(home.path().join("docs")).unwrap();
    std::fs::write(
        home.path().join("docs").join("runbook.txt"),
        "Restart the SFTP gateway after rotating the host key.",
    )
    .unwrap();

    let out = replydesk(home.path())
        .args(["--json", "ingest"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let first = json(&out);
    assert_eq!(first["emails"]["outcome"], "inserted");
    assert_eq!(first["documents"]["files"], 1);
    assert_eq!(first["documents"]["sources"][0]["source"], "runbook.txt");

    let out = replydesk(home.path())
        .args(["--json", "ingest"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let second = json(&out);
    assert_eq!(second["emails"]["outcome"], "already_present");
    assert_eq!(second["documents"]["skipped"], true);
    assert_eq!(first["stats"]["embeddings"], second["stats"]["embeddings"]);
}

#[test]
fn test_search_returns_hits() {
    let home = TempDir::new().unwrap();
    mock_embeddings(home.path());

    let out = replydesk(home.path())
        .args(["--json", "search", "AS2 certificate expired", "-k", "3"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let result = json(&out);
    assert_eq!(result["hits"].as_array().unwrap().len(), 3);
}

#[test]
fn test_stale_index_degrades_until_reset() {
    let home = TempDir::new().unwrap();
    mock_embeddings(home.path());
    std::fs::create_dir(home.path().join("docs")).unwrap();
    replydesk(home.path()).arg("ingest").assert().success();

    std::fs::write(
        home.path().join("replydesk.toml"),
        "[embedding]\nprovider = \"mock\"\ndimensions = 64\n",
    )
    .unwrap();

    let out = replydesk(home.path())
        .args(["--json", "search", "AS2 certificate expired"])
        .assert()
        .success()
        .stderr(predicate::str::contains("ingest --reset"))
        .get_output()
        .stdout
        .clone();
    assert!(json(&out)["hits"].as_array().unwrap().is_empty());

    replydesk(home.path())
        .arg("ingest")
        .assert()
        .failure()
        .stderr(predicate::str::contains("different embedder"));

    let out = replydesk(home.path())
        .args(["--json", "ingest", "--reset"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report = json(&out);
    assert_eq!(report["emails"]["outcome"], "inserted");
    assert_eq!(report["stats"]["dimensions"], 64);
}
