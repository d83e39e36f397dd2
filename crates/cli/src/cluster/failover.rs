// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health probing and failover promotion. Runs on primary and failover
//! nodes only; workers never initiate failover.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::health::{HealthStatus, HttpSpec, Prober};
use crate::notify::Severity;
use crate::store::NodeRecord;

use super::{ClusterState, Coordinator, NodeRole};

const PROBE_TIMEOUT_SECS: u64 = 5;

impl Coordinator {
    /// One probe pass over every peer, then failover evaluation.
    pub async fn health_check_tick(&self, prober: &Prober) {
        let peers: Vec<NodeRecord> = {
            let nodes = self.nodes.read();
            nodes.values().filter(|n| n.node_id != self.node_id).cloned().collect()
        };

        let now = self.clock.utc();
        for peer in peers {
            let spec = HttpSpec {
                endpoint: format!("http://{}:{}/health", peer.host, peer.port),
                timeout_secs: PROBE_TIMEOUT_SECS,
                expected_status: 200,
                expected_content: None,
                fallback: None,
            };
            let result = prober.evaluate(&crate::health::CheckSpec::Http(spec), None).await;
            let reachable = result.status == HealthStatus::Healthy
                || result.status == HealthStatus::Degraded;

            let deadline = self.heartbeat_deadline();
            let mut nodes = self.nodes.write();
            if let Some(node) = nodes.get_mut(&peer.node_id) {
                node.is_reachable = reachable;
                if reachable {
                    node.last_heartbeat = Some(now);
                    node.is_healthy = true;
                } else {
                    let stale = node
                        .last_heartbeat
                        .map(|hb| now - hb >= deadline)
                        .unwrap_or(true);
                    if stale {
                        node.is_healthy = false;
                    }
                }
            }
        }

        self.persist_all().await;
        self.evaluate_failover().await;
        self.evaluate_cluster_state();
    }

    /// Promote when the primary has been unreachable past the threshold.
    async fn evaluate_failover(&self) {
        if self.role() != NodeRole::Failover {
            return;
        }

        let now = self.clock.utc();
        let threshold = TimeDelta::seconds(self.config.failover_threshold_secs as i64);
        let primary_down = {
            let primary_id = self.primary_id.read().clone();
            let nodes = self.nodes.read();
            primary_id.and_then(|id| nodes.get(&id).cloned()).map(|primary| {
                let stale = primary
                    .last_heartbeat
                    .map(|hb| now - hb >= threshold)
                    .unwrap_or(false);
                (!primary.is_healthy && stale, primary.node_id)
            })
        };

        if let Some((true, old_primary)) = primary_down {
            self.promote(Some(&old_primary)).await;
        }
    }

    /// failover → primary: mutate the local role, persist, log the event,
    /// fire callbacks (outside any lock).
    pub async fn promote(&self, old_primary: Option<&str>) {
        warn!(node = %self.node_id, from = old_primary, "promoting to primary");

        *self.role.write() = NodeRole::Primary;
        *self.primary_id.write() = Some(self.node_id.clone());
        *self.cluster_state.write() = ClusterState::Failover;

        let now = self.clock.utc();
        let self_record = {
            let mut nodes = self.nodes.write();
            if let Some(node) = nodes.get_mut(&self.node_id) {
                node.role = NodeRole::Primary.as_str().to_owned();
                Some(node.clone())
            } else {
                None
            }
        };
        if let Some(node) = self_record {
            if let Err(e) = self.store.save_node(&node, now).await {
                warn!("persist promoted role: {e}");
            }
        }

        if let Err(e) = self
            .store
            .append_failover("failover", old_primary, &self.node_id, "primary unreachable", now)
            .await
        {
            warn!("persist failover log: {e}");
        }

        self.notifier.notify(
            Severity::Critical,
            "cluster",
            Some(&self.node_id),
            format!(
                "failover: {} promoted to primary (was {})",
                self.node_id,
                old_primary.unwrap_or("unknown")
            ),
        );

        // Clone the registrations so callbacks run without the lock held.
        let (on_failover, on_role_change) = {
            let callbacks = self.callbacks.lock();
            (callbacks.on_failover.clone(), callbacks.on_role_change.clone())
        };
        for callback in on_failover {
            callback(old_primary, &self.node_id);
        }
        for callback in on_role_change {
            callback(NodeRole::Primary);
        }

        info!(node = %self.node_id, "now acting as primary");
    }
}

/// Drive health checks until shutdown. Spawned on primary and failover
/// nodes only.
pub async fn run(coordinator: Arc<Coordinator>, prober: Prober, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(
        coordinator.config().health_check_interval_secs,
    ));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }
        coordinator.health_check_tick(&prober).await;
    }
}

#[cfg(test)]
#[path = "failover_tests.rs"]
mod tests;
