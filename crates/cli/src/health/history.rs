// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use super::{CheckResult, HealthStatus};

pub const DEFAULT_CAPACITY: usize = 100;

/// Windowed health summary for one service.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub status: HealthStatus,
    pub checks_count: usize,
    /// Percentage of checks in the window that were healthy.
    pub success_rate: f64,
    pub avg_response_time_ms: f64,
    pub last_status: Option<HealthStatus>,
    pub last_check: Option<DateTime<Utc>>,
}

impl HealthSummary {
    fn empty() -> Self {
        Self {
            status: HealthStatus::Unknown,
            checks_count: 0,
            success_rate: 0.0,
            avg_response_time_ms: 0.0,
            last_status: None,
            last_check: None,
        }
    }
}

/// Bounded per-service ring of recent check results.
pub struct CheckHistory {
    capacity: usize,
    rings: Mutex<HashMap<String, VecDeque<CheckResult>>>,
}

impl CheckHistory {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, rings: Mutex::new(HashMap::new()) }
    }

    pub fn record(&self, service: &str, result: CheckResult) {
        let mut rings = self.rings.lock();
        let ring = rings.entry(service.to_owned()).or_default();
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(result);
    }

    /// Summarize checks recorded within the last `window_minutes`, as of `now`.
    pub fn summary(&self, service: &str, window_minutes: i64, now: DateTime<Utc>) -> HealthSummary {
        let rings = self.rings.lock();
        let Some(ring) = rings.get(service) else {
            return HealthSummary::empty();
        };

        let cutoff = now - TimeDelta::minutes(window_minutes);
        let recent: Vec<&CheckResult> = ring.iter().filter(|c| c.timestamp >= cutoff).collect();
        if recent.is_empty() {
            return HealthSummary::empty();
        }

        let healthy = recent.iter().filter(|c| c.status == HealthStatus::Healthy).count();
        let success_rate = healthy as f64 / recent.len() as f64 * 100.0;
        let avg_response_time_ms =
            recent.iter().map(|c| c.response_time_ms).sum::<f64>() / recent.len() as f64;

        let status = if success_rate >= 95.0 {
            HealthStatus::Healthy
        } else if success_rate >= 80.0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        };

        let last = recent[recent.len() - 1];
        HealthSummary {
            status,
            checks_count: recent.len(),
            success_rate,
            avg_response_time_ms,
            last_status: Some(last.status),
            last_check: Some(last.timestamp),
        }
    }

    /// Consecutive failures (non-healthy results) at the tail of the ring.
    pub fn consecutive_failures(&self, service: &str) -> u32 {
        let rings = self.rings.lock();
        let Some(ring) = rings.get(service) else {
            return 0;
        };
        ring.iter().rev().take_while(|c| c.status != HealthStatus::Healthy).count() as u32
    }
}

impl Default for CheckHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
