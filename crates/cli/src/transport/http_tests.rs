// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::assigner::Assigner;
use crate::clock::{ManualClock, SharedClock};
use crate::cluster::Coordinator;
use crate::config::{ClusterConfig, FileConfig, SupervisorConfig};
use crate::health::Prober;
use crate::notify::Notifier;
use crate::store::Store;
use crate::supervisor::Supervisor;
use crate::test_support::FakeMux;
use crate::transport::AppState;

use axum_test::TestServer;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

async fn server() -> (TestServer, Arc<AppState>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("warden.toml");
    std::fs::write(&config_path, "").unwrap();
    let store = Store::open(&dir.path().join("warden.db")).await.unwrap();
    let clock: SharedClock = Arc::new(ManualClock::new());
    let notifier = Notifier::new(clock.clone());
    let mux = Arc::new(FakeMux::new());

    let file: FileConfig = FileConfig::default();
    let assigner = Arc::new(
        Assigner::new(
            store.clone(),
            mux.clone(),
            notifier.clone(),
            clock.clone(),
            file.assigner.clone(),
        )
        .unwrap(),
    );
    let supervisor = Arc::new(Supervisor::new(
        store.clone(),
        Prober::new(clock.clone()),
        notifier.clone(),
        clock.clone(),
        SupervisorConfig {
            log_directory: dir.path().join("logs"),
            pid_directory: dir.path().join("pids"),
            ..SupervisorConfig::default()
        },
        vec![],
    ));
    let coordinator = Coordinator::new(
        ClusterConfig {
            node_id: "self".to_owned(),
            ..ClusterConfig::default()
        },
        vec![],
        store.clone(),
        notifier,
        clock,
    )
    .await
    .unwrap();

    let executor = Arc::new(crate::remote::RemoteExecutor::new(
        std::time::Duration::from_secs(300),
        std::time::Duration::from_secs(5),
        Arc::new(ManualClock::new()),
    ));
    let state = Arc::new(AppState {
        assigner,
        supervisor,
        coordinator,
        executor,
        store,
        config_path,
        shutdown: CancellationToken::new(),
    });
    let server = TestServer::new(super::super::router(Arc::clone(&state))).unwrap();
    (server, state, dir)
}

#[tokio::test]
async fn health_reports_metrics() {
    let (server, _state, _dir) = server().await;
    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert!(body["cpu_usage"].is_number());
    assert!(body["memory_usage"].is_number());
}

#[tokio::test]
async fn heartbeat_unknown_node_is_404() {
    let (server, _state, _dir) = server().await;
    let response = server
        .post("/cluster/heartbeat")
        .json(&json!({
            "node_id": "ghost",
            "role": "worker",
            "timestamp": "2026-01-01T00:00:00Z",
            "cpu_usage": 1.0,
            "memory_usage": 2.0,
            "disk_usage": 3.0,
        }))
        .await;
    response.assert_status(axum::http::StatusCode::NOT_FOUND);

    let body: Value = response.json();
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"]["kind"], "not_found");
}

#[tokio::test]
async fn heartbeat_known_node_is_accepted() {
    let (server, state, _dir) = server().await;
    state
        .coordinator
        .add_node("w1", crate::cluster::NodeRole::Worker, "127.0.0.1", 1, vec![])
        .await
        .unwrap();

    let response = server
        .post("/cluster/heartbeat")
        .json(&json!({
            "node_id": "w1",
            "role": "worker",
            "timestamp": "2026-01-01T00:00:00Z",
            "cpu_usage": 1.0,
            "memory_usage": 2.0,
            "disk_usage": 3.0,
        }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["ok"], true);
}

#[tokio::test]
async fn submit_then_fetch_prompt_round_trips() {
    let (server, _state, _dir) = server().await;

    let response = server
        .post("/api/v1/prompts")
        .json(&json!({ "content": "fix the login flow", "priority": 5 }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let id = body["prompt"]["id"].as_i64().unwrap();

    let response = server.get(&format!("/api/v1/prompts/{id}")).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["prompt"]["content"], "fix the login flow");
    assert_eq!(body["prompt"]["priority"], 5);
    assert_eq!(body["prompt"]["status"], "pending");
}

#[tokio::test]
async fn retry_on_pending_prompt_returns_false() {
    let (server, _state, _dir) = server().await;
    let response = server
        .post("/api/v1/prompts")
        .json(&json!({ "content": "task" }))
        .await;
    let id = response.json::<Value>()["prompt"]["id"].as_i64().unwrap();

    let response = server.post(&format!("/api/v1/prompts/{id}/retry")).await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["retried"], false);
}

#[tokio::test]
async fn missing_prompt_is_404_envelope() {
    let (server, _state, _dir) = server().await;
    let response = server.get("/api/v1/prompts/999").await;
    response.assert_status(axum::http::StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["ok"], false);
}

#[tokio::test]
async fn unknown_service_start_is_404() {
    let (server, _state, _dir) = server().await;
    let response = server.post("/api/v1/services/ghost/start").await;
    response.assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cluster_status_lists_self() {
    let (server, _state, _dir) = server().await;
    let response = server.get("/api/v1/cluster").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["cluster"]["node_id"], "self");
    assert_eq!(body["cluster"]["role"], "primary");
}

#[tokio::test]
async fn shutdown_cancels_the_token() {
    let (server, state, _dir) = server().await;
    let response = server.post("/api/v1/shutdown").await;
    response.assert_status_ok();
    assert!(state.shutdown.is_cancelled());
}

#[tokio::test]
async fn allocate_with_no_capable_node_is_503() {
    let (server, _state, _dir) = server().await;
    let response = server
        .post("/api/v1/cluster/allocate")
        .json(&json!({ "resource_type": "gpu", "requester": "test" }))
        .await;
    response.assert_status(axum::http::StatusCode::SERVICE_UNAVAILABLE);
}
