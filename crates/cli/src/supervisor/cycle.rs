// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic supervision loop.

use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Supervisor;

/// Drive supervision cycles until shutdown.
pub async fn run(supervisor: Arc<Supervisor>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(supervisor.check_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }
        debug!("supervision cycle");
        supervisor.supervision_cycle().await;
    }
}
