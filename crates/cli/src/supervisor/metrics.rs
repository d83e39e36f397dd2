// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metric emission, independent of the supervision cycle. Snapshots go to
//! every registered collector (best-effort) and to the store.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{ServiceState, Supervisor};

pub const EMIT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize)]
pub struct MetricSnapshot {
    pub service_id: String,
    pub state: ServiceState,
    pub cpu_percent: f32,
    pub memory_mb: f64,
    pub uptime_secs: u64,
    pub restart_count: u32,
    pub total_failures: u32,
}

impl Supervisor {
    /// Register a collector for periodic snapshots. Delivery is lossy:
    /// a full collector misses that round.
    pub fn register_collector(&self, tx: mpsc::Sender<Vec<MetricSnapshot>>) {
        self.collectors.lock().push(tx);
    }

    pub async fn snapshot_metrics(&self) -> Vec<MetricSnapshot> {
        let services = self.services.lock().await;
        services
            .iter()
            .map(|r| MetricSnapshot {
                service_id: r.config.id.clone(),
                state: r.state,
                cpu_percent: r.metrics.cpu_percent,
                memory_mb: r.metrics.memory_mb,
                uptime_secs: r.metrics.uptime_secs,
                restart_count: r.metrics.restart_count,
                total_failures: r.metrics.total_failures,
            })
            .collect()
    }

    /// One emission round: snapshot, persist, fan out.
    pub async fn emit_metrics(&self) {
        let snapshots = self.snapshot_metrics().await;
        let now = self.clock.utc();

        for snapshot in &snapshots {
            if snapshot.state == ServiceState::Running {
                if let Err(e) = self
                    .store
                    .record_service_metric(
                        &snapshot.service_id,
                        f64::from(snapshot.cpu_percent),
                        snapshot.memory_mb,
                        snapshot.uptime_secs as i64,
                        now,
                    )
                    .await
                {
                    warn!(service = %snapshot.service_id, "persist metric: {e}");
                }
            }
        }

        let collectors = self.collectors.lock().clone();
        for tx in collectors {
            let _ = tx.try_send(snapshots.clone());
        }
    }
}

/// Drive metric emission until shutdown.
pub async fn run(supervisor: Arc<Supervisor>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(EMIT_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }
        supervisor.emit_metrics().await;
    }
}
