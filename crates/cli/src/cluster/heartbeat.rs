// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat loop: every node refreshes its own metrics; workers and the
//! failover node additionally POST them to the current primary.

use std::sync::Arc;
use std::time::Duration;

use sysinfo::Disks;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Coordinator, HeartbeatPayload};

const POST_TIMEOUT: Duration = Duration::from_secs(5);

impl Coordinator {
    /// Whole-host cpu/memory/disk percentages.
    pub fn self_metrics(&self) -> (f64, f64, f64) {
        let mut system = self.system.lock();
        system.refresh_cpu_usage();
        system.refresh_memory();
        let cpu = f64::from(system.global_cpu_usage());
        let memory = if system.total_memory() > 0 {
            system.used_memory() as f64 / system.total_memory() as f64 * 100.0
        } else {
            0.0
        };
        drop(system);

        let disks = Disks::new_with_refreshed_list();
        let (total, available) = disks
            .iter()
            .fold((0u64, 0u64), |(t, a), d| (t + d.total_space(), a + d.available_space()));
        let disk = if total > 0 {
            (total - available) as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        (cpu, memory, disk)
    }

    /// One heartbeat: update self in the node table, then report to the
    /// primary unless we are it.
    pub async fn heartbeat_tick(&self) {
        let (cpu, memory, disk) = self.self_metrics();
        let now = self.clock.utc();

        let payload = HeartbeatPayload {
            node_id: self.node_id.clone(),
            role: self.role(),
            timestamp: now,
            cpu_usage: cpu,
            memory_usage: memory,
            disk_usage: disk,
        };

        let self_record = {
            let mut nodes = self.nodes.write();
            if let Some(node) = nodes.get_mut(&self.node_id) {
                node.last_heartbeat = Some(now);
                node.cpu_usage = cpu;
                node.memory_usage = memory;
                node.disk_usage = disk;
                node.is_healthy = true;
                node.is_reachable = true;
                node.role = self.role().as_str().to_owned();
                Some(node.clone())
            } else {
                None
            }
        };
        if let Some(node) = self_record {
            if let Err(e) = self.store.save_node(&node, now).await {
                warn!("persist self heartbeat: {e}");
            }
        }

        if self.is_active_primary() {
            return;
        }

        let primary_url = {
            let primary_id = self.primary_id.read().clone();
            let nodes = self.nodes.read();
            primary_id
                .and_then(|id| nodes.get(&id).cloned())
                .map(|p| format!("http://{}:{}/cluster/heartbeat", p.host, p.port))
        };
        let Some(url) = primary_url else {
            debug!("no known primary to heartbeat");
            return;
        };

        let delivered = self
            .client
            .post(&url)
            .timeout(POST_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false);

        let mut missed = self.missed_acks.lock();
        if delivered {
            *missed = 0;
        } else {
            *missed += 1;
            // Workers never act on primary loss; they only log it.
            if *missed >= 3 {
                warn!(missed = *missed, "heartbeats to primary unacknowledged");
            }
        }
    }
}

/// Drive heartbeats until shutdown.
pub async fn run(coordinator: Arc<Coordinator>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(
        coordinator.config().heartbeat_interval_secs,
    ));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }
        coordinator.heartbeat_tick().await;
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
