// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface: the cluster wire protocol plus the operator control API.

pub mod http;

use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::assigner::Assigner;
use crate::cluster::Coordinator;
use crate::error::Result;
use crate::remote::RemoteExecutor;
use crate::store::Store;
use crate::supervisor::Supervisor;

/// Shared application state handed to every handler.
pub struct AppState {
    pub assigner: Arc<Assigner>,
    pub supervisor: Arc<Supervisor>,
    pub coordinator: Arc<Coordinator>,
    pub executor: Arc<RemoteExecutor>,
    pub store: Store,
    pub config_path: PathBuf,
    pub shutdown: CancellationToken,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Cluster wire protocol.
        .route("/cluster/heartbeat", post(http::cluster_heartbeat))
        .route("/health", get(http::health))
        // Operator control surface.
        .route("/api/v1/prompts", post(http::submit_prompt).get(http::list_prompts))
        .route("/api/v1/prompts/retry_all", post(http::retry_all_failed))
        .route("/api/v1/prompts/clear", post(http::clear_prompts))
        .route("/api/v1/prompts/{id}", get(http::get_prompt))
        .route("/api/v1/prompts/{id}/retry", post(http::retry_prompt))
        .route("/api/v1/prompts/{id}/reassign", post(http::reassign_prompt))
        .route("/api/v1/prompts/{id}/cancel", post(http::cancel_prompt))
        .route("/api/v1/prompts/{id}/history", get(http::prompt_history))
        .route("/api/v1/sessions", get(http::list_sessions))
        .route("/api/v1/services", get(http::supervisor_status))
        .route("/api/v1/services/{id}/start", post(http::start_service))
        .route("/api/v1/services/{id}/stop", post(http::stop_service))
        .route("/api/v1/services/{id}/restart", post(http::restart_service))
        .route("/api/v1/cluster", get(http::cluster_status))
        .route("/api/v1/cluster/allocate", post(http::allocate_resource))
        .route("/api/v1/cluster/release", post(http::release_resource))
        .route("/api/v1/cluster/probe/{node_id}", post(http::probe_node))
        .route("/api/v1/reload", post(http::reload_config))
        .route("/api/v1/shutdown", post(http::shutdown))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until the shutdown token fires.
pub async fn serve(state: Arc<AppState>, host: &str, port: u16) -> Result<()> {
    let shutdown = state.shutdown.clone();
    let app = router(state);
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!(host, port, "http surface listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
