// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-service lifecycle state machine and backoff arithmetic.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::process::Child;

use crate::config::{RestartPolicy, ServiceConfig};
use crate::error::{Error, Result};
use crate::store::ServiceStateRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
    Backoff,
    Fatal,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Failed => "failed",
            Self::Backoff => "backoff",
            Self::Fatal => "fatal",
        }
    }

    /// Legal edges of the lifecycle machine. Beyond the supervision paths,
    /// operators may start a failed service directly, stop one out of
    /// backoff, and reset a fatal one to stopped.
    pub fn can_transition(&self, to: ServiceState) -> bool {
        use ServiceState::*;
        matches!(
            (self, to),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Failed)
                | (Starting, Stopping)
                | (Running, Failed)
                | (Running, Stopping)
                | (Stopping, Stopped)
                | (Failed, Backoff)
                | (Failed, Fatal)
                | (Failed, Starting)
                | (Backoff, Starting)
                | (Backoff, Stopped)
                | (Fatal, Stopped)
        )
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backoff before restart attempt number `attempts` (0-based):
/// `min(retry_delay · multiplier^attempts, max_backoff)`.
pub fn backoff_delay(policy: &RestartPolicy, attempts: u32) -> Duration {
    let raw = policy.retry_delay_secs as f64 * policy.backoff_multiplier.powi(attempts as i32);
    Duration::from_secs_f64(raw.min(policy.max_backoff_secs as f64).max(0.0))
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ServiceMetrics {
    pub cpu_percent: f32,
    pub memory_mb: f64,
    pub uptime_secs: u64,
    pub restart_count: u32,
    pub total_failures: u32,
    pub health_failures: u32,
}

/// Runtime state for one managed service.
pub struct ServiceRuntime {
    pub config: ServiceConfig,
    pub state: ServiceState,
    pub child: Option<Child>,
    pub pid: Option<u32>,
    pub started_at: Option<Instant>,
    pub started_wall: Option<DateTime<Utc>>,
    pub restart_attempts: u32,
    pub next_restart_at: Option<Instant>,
    pub next_restart_wall: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub metrics: ServiceMetrics,
}

impl ServiceRuntime {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            state: ServiceState::Stopped,
            child: None,
            pid: None,
            started_at: None,
            started_wall: None,
            restart_attempts: 0,
            next_restart_at: None,
            next_restart_wall: None,
            last_error: None,
            metrics: ServiceMetrics::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Move to `to`, enforcing machine legality. Returns the prior state.
    pub fn transition(&mut self, to: ServiceState) -> Result<ServiceState> {
        if !self.state.can_transition(to) {
            return Err(Error::invalid_state(format!(
                "service {}: {} -> {to} is not a legal transition",
                self.config.id, self.state
            )));
        }
        let from = self.state;
        self.state = to;
        if to == ServiceState::Running {
            // A confirmed start clears the failure streak.
            self.restart_attempts = 0;
            self.next_restart_at = None;
            self.next_restart_wall = None;
        }
        Ok(from)
    }

    pub fn state_row(&self, now: DateTime<Utc>) -> ServiceStateRow {
        ServiceStateRow {
            id: self.config.id.clone(),
            state: self.state.as_str().to_owned(),
            pid: self.pid.map(i64::from),
            started_at: self.started_wall,
            restart_attempts: i64::from(self.restart_attempts),
            next_restart_at: self.next_restart_wall,
            last_error: self.last_error.clone(),
            updated_at: now,
        }
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
