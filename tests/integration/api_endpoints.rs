//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - Health is reachable without a token
//! - Every other route requires the bearer token
//! - Host status and uptime windows are served from the shared state
//! - Chat commands are answered and optionally delivered to Discord

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use chrono::Utc;
use hostwatch::{
    api::{ApiConfig, ApiState, spawn_api_server},
    config::Host,
    discord::DiscordClient,
    probe::{FailureKind, ProbeFailure},
    status::StatusBoard,
    storage::{BucketGranularity, SampleStore, memory::MemorySampleStore},
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::helpers::{remote_host, snapshot};

const TOKEN: &str = "test-token";

struct TestApi {
    addr: SocketAddr,
    board: StatusBoard,
    store: Arc<MemorySampleStore>,
    client: reqwest::Client,
}

impl TestApi {
    fn url(&self, route: &str) -> String {
        format!("http://{}{route}", self.addr)
    }

    async fn get(&self, route: &str) -> reqwest::Response {
        self.client
            .get(self.url(route))
            .bearer_auth(TOKEN)
            .send()
            .await
            .unwrap()
    }
}

async fn spawn_test_api(discord: Option<DiscordClient>) -> TestApi {
    let hosts: Arc<[Host]> =
        vec![Host::local("hub"), remote_host("web1", "10.0.0.5")].into();
    let board = StatusBoard::new();
    let store = Arc::new(MemorySampleStore::new(BucketGranularity::HOURLY));

    let mut state = ApiState::new(hosts, board.clone(), store.clone());
    if let Some(discord) = discord {
        state = state.with_discord(discord);
    }

    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        auth_token: Some(TOKEN.to_string()),
    };
    let addr = spawn_api_server(config, state).await.unwrap();

    TestApi {
        addr,
        board,
        store,
        client: reqwest::Client::new(),
    }
}

#[tokio::test]
async fn test_health_without_token() {
    let api = spawn_test_api(None).await;

    let response = reqwest::get(api.url("/api/v1/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage_healthy"], true);
    assert_eq!(body["hosts"], 2);
}

#[tokio::test]
async fn test_token_required() {
    let api = spawn_test_api(None).await;

    let missing = reqwest::get(api.url("/api/v1/hosts")).await.unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = api
        .client
        .get(api.url("/api/v1/hosts"))
        .bearer_auth("nope")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_list_and_get_hosts() {
    let api = spawn_test_api(None).await;
    api.board.record_success("hub", snapshot(Utc::now())).await;
    api.board
        .record_failure(
            "web1",
            &ProbeFailure::new("web1", FailureKind::Auth, "Permission denied"),
            Utc::now(),
        )
        .await;

    let body: Value = api.get("/api/v1/hosts").await.json().await.unwrap();
    assert_eq!(body["total"], 2);
    assert_eq!(body["hosts"][0]["name"], "hub");
    assert_eq!(body["hosts"][0]["local"], true);
    assert_eq!(body["hosts"][0]["status"]["state"], "online");

    let web1: Value = api.get("/api/v1/hosts/web1").await.json().await.unwrap();
    assert_eq!(web1["address"], "10.0.0.5");
    assert_eq!(web1["status"]["state"], "unreachable");
    assert_eq!(web1["status"]["kind"], "auth");

    let missing = api.get("/api/v1/hosts/nope").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_uptime_window() {
    let api = spawn_test_api(None).await;
    api.store.record("web1", Utc::now(), true).await.unwrap();

    let body: Value = api
        .get("/api/v1/hosts/web1/uptime?buckets=4")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["buckets"].as_array().unwrap().len(), 4);
    assert_eq!(body["buckets"][3]["status"], "up");
    assert_eq!(body["up"], 1);
    assert_eq!(body["unknown"], 3);
    assert_eq!(body["uptime_percentage"], 100.0);

    let default: Value = api.get("/api/v1/hosts/web1/uptime").await.json().await.unwrap();
    assert_eq!(default["buckets"].as_array().unwrap().len(), 48);

    let invalid = api.get("/api/v1/hosts/web1/uptime?buckets=0").await;
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_command_replies() {
    let api = spawn_test_api(None).await;

    let body: Value = api
        .client
        .post(api.url("/api/v1/commands"))
        .bearer_auth(TOKEN)
        .json(&json!({ "content": "!status web1" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["delivered"], 0);
    assert_eq!(
        body["replies"][0]["content"],
        "Host `web1` has not been checked yet"
    );
}

#[tokio::test]
async fn test_command_delivered_to_channel() {
    let discord = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/channels/7/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "99" })))
        .expect(1)
        .mount(&discord)
        .await;

    let client = DiscordClient::with_base_url("bot-token", discord.uri()).unwrap();
    let api = spawn_test_api(Some(client)).await;
    api.board.record_success("hub", snapshot(Utc::now())).await;

    let body: Value = api
        .client
        .post(api.url("/api/v1/commands"))
        .bearer_auth(TOKEN)
        .json(&json!({ "content": "!uptime hub", "channel_id": 7 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["delivered"], 1);
    assert_eq!(body["replies"][0]["embeds"][0]["title"], "Uptime History: hub");
}
