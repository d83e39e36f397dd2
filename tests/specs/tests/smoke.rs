// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests spawning the real `warden` binary and driving
//! it over the HTTP control surface.

use std::time::Duration;

use serde_json::Value;

use warden_specs::WardenProcess;

const TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn health_and_cluster_status() -> anyhow::Result<()> {
    let warden = WardenProcess::start(
        r#"
[cluster]
node_id = "smoke"
role = "primary"
"#,
    )?;
    warden.wait_healthy(TIMEOUT).await?;

    let health: Value =
        reqwest::get(format!("{}/health", warden.base_url())).await?.json().await?;
    assert_eq!(health["status"], "healthy");
    assert!(health["cpu_usage"].is_number());

    let cluster: Value =
        reqwest::get(format!("{}/api/v1/cluster", warden.base_url())).await?.json().await?;
    assert_eq!(cluster["cluster"]["node_id"], "smoke");
    assert_eq!(cluster["cluster"]["role"], "primary");

    Ok(())
}

#[tokio::test]
async fn prompt_lifecycle_over_http() -> anyhow::Result<()> {
    let warden = WardenProcess::start("")?;
    warden.wait_healthy(TIMEOUT).await?;
    let client = reqwest::Client::new();

    let submitted: Value = client
        .post(format!("{}/api/v1/prompts", warden.base_url()))
        .json(&serde_json::json!({ "content": "smoke task", "priority": 3 }))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(submitted["ok"], true);
    let id = submitted["prompt"]["id"].as_i64().unwrap_or(0);
    assert!(id > 0);

    let listed: Value = client
        .get(format!("{}/api/v1/prompts", warden.base_url()))
        .query(&[("status", "pending")])
        .send()
        .await?
        .json()
        .await?;
    let prompts = listed["prompts"].as_array().cloned().unwrap_or_default();
    assert!(prompts.iter().any(|p| p["id"] == id));

    let cancelled: Value = client
        .post(format!("{}/api/v1/prompts/{id}/cancel", warden.base_url()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(cancelled["ok"], true);

    let fetched: Value = client
        .get(format!("{}/api/v1/prompts/{id}", warden.base_url()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(fetched["prompt"]["status"], "cancelled");

    Ok(())
}

#[tokio::test]
async fn reload_and_shutdown_exit_zero() -> anyhow::Result<()> {
    let mut warden = WardenProcess::start("")?;
    warden.wait_healthy(TIMEOUT).await?;
    let client = reqwest::Client::new();

    let reloaded: Value = client
        .post(format!("{}/api/v1/reload", warden.base_url()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(reloaded["ok"], true);

    let accepted: Value = client
        .post(format!("{}/api/v1/shutdown", warden.base_url()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(accepted["ok"], true);

    let status = warden.wait_exit(TIMEOUT).await?;
    assert_eq!(status.code(), Some(0));
    Ok(())
}

#[tokio::test]
async fn heartbeat_from_unknown_node_is_rejected() -> anyhow::Result<()> {
    let warden = WardenProcess::start("")?;
    warden.wait_healthy(TIMEOUT).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/cluster/heartbeat", warden.base_url()))
        .json(&serde_json::json!({
            "node_id": "stranger",
            "role": "worker",
            "timestamp": "2026-01-01T00:00:00Z",
            "cpu_usage": 0.0,
            "memory_usage": 0.0,
            "disk_usage": 0.0,
        }))
        .send()
        .await?;
    assert_eq!(response.status().as_u16(), 404);
    Ok(())
}
