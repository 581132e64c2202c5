//! Integration tests for status messages against a mocked Discord API
//!
//! These tests verify that:
//! - The first update posts a message and remembers its id
//! - A restart rebinds to the remembered message and edits it
//! - A deleted message is replaced by a new one
//! - Rate limiting keeps the binding for the next cycle

use std::path::Path;
use std::sync::Arc;

use assert_matches::assert_matches;
use hostwatch::{
    discord::{DiscordClient, DiscordSink, MessageIdRegistry},
    presentation::{Reconciler, SinkError, UnitId, UpdateOutcome},
    probe::FailureKind,
    status::HostStatus,
    storage::{BucketGranularity, memory::MemorySampleStore},
};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::helpers::{fixed_time, remote_host, snapshot};

const CHANNEL: u64 = 42;

fn reconciler(server: &MockServer, registry_path: &Path) -> Reconciler {
    let client = DiscordClient::with_base_url("test-token", server.uri()).unwrap();
    let sink = DiscordSink::new(client, CHANNEL, MessageIdRegistry::load(registry_path));
    Reconciler::new(
        Arc::new(sink),
        Arc::new(MemorySampleStore::new(BucketGranularity::HOURLY)),
        BucketGranularity::HOURLY,
    )
}

fn offline() -> HostStatus {
    HostStatus::Unreachable {
        kind: FailureKind::Connect,
        reason: "connection refused".to_string(),
        last_known: None,
        since: fixed_time(),
    }
}

async fn mock_create(server: &MockServer, id: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path(format!("/channels/{CHANNEL}/messages")))
        .and(header("Authorization", "Bot test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": id })))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_create_then_rebind_after_restart() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let registry_path = dir.path().join("message_ids.json");
    let host = remote_host("web1", "10.0.0.5");

    mock_create(&server, "1001", 1).await;

    let first = reconciler(&server, &registry_path);
    let online = HostStatus::Online(snapshot(fixed_time()));
    let outcome = first.update(&host, &online, fixed_time()).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Created(UnitId(1001)));

    // identical content is not sent again
    let outcome = first.update(&host, &online, fixed_time()).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Unchanged);

    let persisted: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&registry_path).unwrap()).unwrap();
    assert_eq!(persisted, json!({ "web1": 1001 }));

    Mock::given(method("GET"))
        .and(path(format!("/channels/{CHANNEL}/messages/1001")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "1001" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(format!("/channels/{CHANNEL}/messages/1001")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "1001" })))
        .expect(1)
        .mount(&server)
        .await;

    let restarted = reconciler(&server, &registry_path);
    let outcome = restarted.update(&host, &offline(), fixed_time()).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Rebound(UnitId(1001)));
    assert_eq!(restarted.bound_unit("web1").await, Some(UnitId(1001)));
}

#[tokio::test]
async fn test_deleted_message_is_recreated() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let registry_path = dir.path().join("message_ids.json");
    let host = remote_host("web1", "10.0.0.5");

    Mock::given(method("POST"))
        .and(path(format!("/channels/{CHANNEL}/messages")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "1001" })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mock_create(&server, "2002", 1).await;
    Mock::given(method("PATCH"))
        .and(path(format!("/channels/{CHANNEL}/messages/1001")))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let reconciler = reconciler(&server, &registry_path);
    let online = HostStatus::Online(snapshot(fixed_time()));
    reconciler.update(&host, &online, fixed_time()).await.unwrap();

    let outcome = reconciler.update(&host, &offline(), fixed_time()).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Recreated(UnitId(2002)));
    assert_eq!(reconciler.bound_unit("web1").await, Some(UnitId(2002)));
}

#[tokio::test]
async fn test_rate_limit_keeps_binding() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let registry_path = dir.path().join("message_ids.json");
    let host = remote_host("web1", "10.0.0.5");

    mock_create(&server, "1001", 1).await;
    Mock::given(method("PATCH"))
        .and(path(format!("/channels/{CHANNEL}/messages/1001")))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(format!("/channels/{CHANNEL}/messages/1001")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "1001" })))
        .mount(&server)
        .await;

    let reconciler = reconciler(&server, &registry_path);
    let online = HostStatus::Online(snapshot(fixed_time()));
    reconciler.update(&host, &online, fixed_time()).await.unwrap();

    let result = reconciler.update(&host, &offline(), fixed_time()).await;
    assert_matches!(result, Err(SinkError::Unavailable(_)));
    assert_eq!(reconciler.bound_unit("web1").await, Some(UnitId(1001)));

    // next cycle retries the edit on the same message
    let outcome = reconciler.update(&host, &offline(), fixed_time()).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Edited(UnitId(1001)));
}
