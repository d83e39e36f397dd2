// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handler implementations. Every operator response is an `{ok, ...}`
//! envelope; errors map to HTTP status through their kind.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::cluster::HeartbeatPayload;
use crate::config::FileConfig;
use crate::error::Error;
use crate::store::{NewPrompt, PromptStatus};

use super::AppState;

fn error_response(error: &Error) -> Response {
    let status = StatusCode::from_u16(error.kind.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(json!({
            "ok": false,
            "error": { "kind": error.kind.as_str(), "message": error.message },
        })),
    )
        .into_response()
}

// -- Cluster wire protocol ----------------------------------------------------

/// `POST /cluster/heartbeat` — accept a worker's status report.
pub async fn cluster_heartbeat(
    State(s): State<Arc<AppState>>,
    Json(payload): Json<HeartbeatPayload>,
) -> Response {
    match s.coordinator.receive_heartbeat(&payload).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// `GET /health` — self-assessment with coarse host metrics.
pub async fn health(State(s): State<Arc<AppState>>) -> Response {
    let (cpu, memory, _disk) = s.coordinator.self_metrics();
    Json(json!({
        "status": "healthy",
        "cpu_usage": cpu,
        "memory_usage": memory,
    }))
    .into_response()
}

// -- Prompts ------------------------------------------------------------------

/// `POST /api/v1/prompts`
pub async fn submit_prompt(
    State(s): State<Arc<AppState>>,
    Json(new): Json<NewPrompt>,
) -> Response {
    match s.assigner.submit_prompt(&new).await {
        Ok(prompt) => Json(json!({ "ok": true, "prompt": prompt })).into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListPromptsQuery {
    pub status: Option<PromptStatus>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

/// `GET /api/v1/prompts`
pub async fn list_prompts(
    State(s): State<Arc<AppState>>,
    Query(query): Query<ListPromptsQuery>,
) -> Response {
    match s.store.list_prompts(query.status, query.limit).await {
        Ok(prompts) => Json(json!({ "ok": true, "prompts": prompts })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// `GET /api/v1/prompts/{id}`
pub async fn get_prompt(State(s): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    match s.store.get_prompt(id).await {
        Ok(prompt) => Json(json!({ "ok": true, "prompt": prompt })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// `POST /api/v1/prompts/{id}/retry`
pub async fn retry_prompt(State(s): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    match s.assigner.retry_prompt(id).await {
        Ok(retried) => Json(json!({ "ok": true, "retried": retried })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// `POST /api/v1/prompts/retry_all`
pub async fn retry_all_failed(State(s): State<Arc<AppState>>) -> Response {
    match s.assigner.retry_all_failed().await {
        Ok(count) => Json(json!({ "ok": true, "retried": count })).into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ReassignRequest {
    pub target_session: String,
}

/// `POST /api/v1/prompts/{id}/reassign`
pub async fn reassign_prompt(
    State(s): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(request): Json<ReassignRequest>,
) -> Response {
    match s.assigner.reassign_prompt(id, &request.target_session).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// `POST /api/v1/prompts/{id}/cancel`
pub async fn cancel_prompt(State(s): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    match s.assigner.cancel_prompt(id).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ClearRequest {
    #[serde(default = "default_clear_days")]
    pub days: i64,
}

fn default_clear_days() -> i64 {
    7
}

/// `POST /api/v1/prompts/clear`
pub async fn clear_prompts(
    State(s): State<Arc<AppState>>,
    Json(request): Json<ClearRequest>,
) -> Response {
    match s.assigner.clear_prompts(request.days).await {
        Ok(deleted) => Json(json!({ "ok": true, "deleted": deleted })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// `GET /api/v1/prompts/{id}/history`
pub async fn prompt_history(State(s): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    match s.store.history_for_prompt(id).await {
        Ok(history) => Json(json!({ "ok": true, "history": history })).into_response(),
        Err(e) => error_response(&e),
    }
}

// -- Sessions -----------------------------------------------------------------

/// `GET /api/v1/sessions`
pub async fn list_sessions(State(s): State<Arc<AppState>>) -> Response {
    match s.store.list_sessions().await {
        Ok(sessions) => Json(json!({ "ok": true, "sessions": sessions })).into_response(),
        Err(e) => error_response(&e),
    }
}

// -- Supervisor ---------------------------------------------------------------

/// `GET /api/v1/services`
pub async fn supervisor_status(State(s): State<Arc<AppState>>) -> Response {
    let services = s.supervisor.status().await;
    Json(json!({ "ok": true, "services": services })).into_response()
}

/// `POST /api/v1/services/{id}/start`
pub async fn start_service(State(s): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match s.supervisor.start_service(&id).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// `POST /api/v1/services/{id}/stop`
pub async fn stop_service(State(s): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match s.supervisor.stop_service(&id).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// `POST /api/v1/services/{id}/restart`
pub async fn restart_service(State(s): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match s.supervisor.restart_service(&id).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => error_response(&e),
    }
}

// -- Cluster ------------------------------------------------------------------

/// `GET /api/v1/cluster`
pub async fn cluster_status(State(s): State<Arc<AppState>>) -> Response {
    Json(json!({ "ok": true, "cluster": s.coordinator.status() })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct AllocateRequest {
    pub resource_type: String,
    pub requester: String,
    pub preferred_node: Option<String>,
    #[serde(default)]
    pub priority: i64,
}

/// `POST /api/v1/cluster/allocate`
pub async fn allocate_resource(
    State(s): State<Arc<AppState>>,
    Json(request): Json<AllocateRequest>,
) -> Response {
    let result = s
        .coordinator
        .allocate(
            &request.resource_type,
            &request.requester,
            request.preferred_node.as_deref(),
            request.priority,
        )
        .await;
    match result {
        Ok(Some(allocation)) => {
            Json(json!({ "ok": true, "allocation": allocation })).into_response()
        }
        Ok(None) => error_response(&Error::resource_exhausted(format!(
            "no node available for {}",
            request.resource_type
        ))),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ReleaseRequest {
    pub allocation_id: String,
}

/// `POST /api/v1/cluster/release`
pub async fn release_resource(
    State(s): State<Arc<AppState>>,
    Json(request): Json<ReleaseRequest>,
) -> Response {
    match s.coordinator.release(&request.allocation_id).await {
        Ok(released) => Json(json!({ "ok": true, "released": released })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// `POST /api/v1/cluster/probe/{node_id}` — gather coarse system facts
/// from a node's host over the pooled SSH channel.
pub async fn probe_node(State(s): State<Arc<AppState>>, Path(node_id): Path<String>) -> Response {
    let host = s
        .coordinator
        .status()
        .nodes
        .into_iter()
        .find(|n| n.node_id == node_id)
        .map(|n| n.host);
    let Some(host) = host else {
        return error_response(&Error::not_found(format!("node {node_id}")));
    };

    match s.executor.probe(&crate::remote::RemoteTarget::new(host)).await {
        Ok(facts) => Json(json!({ "ok": true, "facts": facts })).into_response(),
        Err(e) => error_response(&e),
    }
}

// -- Lifecycle ----------------------------------------------------------------

/// `POST /api/v1/reload` — re-read the config file and apply the service
/// set and assigner markers/exclusions.
pub async fn reload_config(State(s): State<Arc<AppState>>) -> Response {
    let config = match FileConfig::load(&s.config_path) {
        Ok(config) => config,
        Err(e) => return error_response(&e),
    };
    if let Err(e) = s.assigner.reload(config.assigner.clone()) {
        return error_response(&e);
    }
    s.supervisor.reload(config.services.clone()).await;
    Json(json!({ "ok": true })).into_response()
}

/// `POST /api/v1/shutdown` — initiate graceful daemon shutdown.
pub async fn shutdown(State(s): State<Arc<AppState>>) -> Response {
    s.shutdown.cancel();
    Json(json!({ "ok": true, "accepted": true })).into_response()
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
