mod common;

use common::{mount_json, mount_json_expect, tether_cmd};
use predicates::str::contains;
use std::fs;
use tempfile::tempdir;
use wiremock::MockServer;

const SYNCED_DOC: &str = "---\ntitle: Weekly notes\ntether_document_id: doc-7\ntether_synced_at: 2026-03-01T08:00:00Z\n---\nLocal edits\n";

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn push_is_blocked_when_remote_changed_after_last_sync() {
    let tmp = tempdir().expect("tempdir");
    let server = MockServer::start().await;
    mount_json(
        &server,
        "GET",
        "/documents/doc-7",
        200,
        r#"{"id": "doc-7", "updated_at": "2026-03-01T08:00:01Z"}"#,
    )
    .await;
    mount_json_expect(&server, "PATCH", "/documents/doc-7", 200, "{}", 0).await;
    let doc = tmp.path().join("notes.md");
    fs::write(&doc, SYNCED_DOC).expect("write doc");

    tether_cmd(tmp.path(), Some(&server.uri()))
        .args(["push", "--file"])
        .arg(&doc)
        .assert()
        .failure()
        .stdout(contains("E003_SYNC_CONFLICT"));

    assert_eq!(fs::read_to_string(&doc).expect("read"), SYNCED_DOC);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn push_overwrites_remote_and_advances_sync_time() {
    let tmp = tempdir().expect("tempdir");
    let server = MockServer::start().await;
    mount_json(
        &server,
        "GET",
        "/documents/doc-7",
        200,
        r#"{"id": "doc-7", "updatedAt": "2026-03-01T07:59:59Z"}"#,
    )
    .await;
    mount_json(
        &server,
        "PATCH",
        "/documents/doc-7",
        200,
        r#"{"id": "doc-7", "updated_at": "2026-03-02T10:15:00Z"}"#,
    )
    .await;
    let doc = tmp.path().join("notes.md");
    fs::write(&doc, SYNCED_DOC).expect("write doc");

    tether_cmd(tmp.path(), Some(&server.uri()))
        .args(["push", "--file", "notes.md"])
        .assert()
        .success()
        .stdout(contains("document_id=doc-7"));

    let requests = server.received_requests().await.expect("recorded requests");
    let patch = requests
        .iter()
        .find(|r| r.method.as_str() == "PATCH")
        .expect("patch sent");
    let body: serde_json::Value = patch.body_json().expect("json body");
    assert_eq!(body["content"], "Local edits\n");

    let rewritten = fs::read_to_string(&doc).expect("read");
    assert!(rewritten.contains("tether_synced_at: 2026-03-02T10:15:00Z\n"));
    assert!(rewritten.contains("title: Weekly notes\n"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_conflict_check_does_not_block_push() {
    let tmp = tempdir().expect("tempdir");
    let server = MockServer::start().await;
    mount_json(&server, "GET", "/documents/doc-7", 503, r#"{"error": "busy"}"#).await;
    mount_json_expect(&server, "PATCH", "/documents/doc-7", 200, "{}", 1).await;
    let doc = tmp.path().join("notes.md");
    fs::write(&doc, SYNCED_DOC).expect("write doc");

    tether_cmd(tmp.path(), Some(&server.uri()))
        .args(["push", "--file", "notes.md"])
        .assert()
        .success();
}
