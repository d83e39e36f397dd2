// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::Utc;

fn result(status: HealthStatus, at: DateTime<Utc>, ms: f64) -> CheckResult {
    CheckResult {
        status,
        response_time_ms: ms,
        timestamp: at,
        message: String::new(),
        details: serde_json::Value::Null,
    }
}

#[test]
fn empty_history_is_unknown() {
    let history = CheckHistory::default();
    let summary = history.summary("web", 60, Utc::now());
    assert_eq!(summary.status, HealthStatus::Unknown);
    assert_eq!(summary.checks_count, 0);
}

#[test]
fn ring_is_bounded() {
    let history = CheckHistory::new(3);
    let now = Utc::now();
    for i in 0..5 {
        history.record("web", result(HealthStatus::Healthy, now, i as f64));
    }
    let summary = history.summary("web", 60, now);
    assert_eq!(summary.checks_count, 3);
    // Oldest two (0ms, 1ms) were evicted.
    assert_eq!(summary.avg_response_time_ms, 3.0);
}

#[yare::parameterized(
    all_healthy = { 20, 0, HealthStatus::Healthy },
    one_in_twenty = { 19, 1, HealthStatus::Healthy },
    ninety_percent = { 18, 2, HealthStatus::Degraded },
    eighty_percent = { 16, 4, HealthStatus::Degraded },
    below_eighty = { 10, 10, HealthStatus::Unhealthy },
)]
fn summary_thresholds(healthy: usize, unhealthy: usize, expected: HealthStatus) {
    let history = CheckHistory::default();
    let now = Utc::now();
    for _ in 0..healthy {
        history.record("svc", result(HealthStatus::Healthy, now, 10.0));
    }
    for _ in 0..unhealthy {
        history.record("svc", result(HealthStatus::Unhealthy, now, 10.0));
    }
    assert_eq!(history.summary("svc", 60, now).status, expected);
}

#[test]
fn window_excludes_old_checks() {
    let history = CheckHistory::default();
    let now = Utc::now();
    history.record("svc", result(HealthStatus::Unhealthy, now - TimeDelta::minutes(90), 5.0));
    history.record("svc", result(HealthStatus::Healthy, now, 5.0));

    let summary = history.summary("svc", 60, now);
    assert_eq!(summary.checks_count, 1);
    assert_eq!(summary.status, HealthStatus::Healthy);
    assert_eq!(summary.last_status, Some(HealthStatus::Healthy));
}

#[test]
fn consecutive_failures_counts_tail_only() {
    let history = CheckHistory::default();
    let now = Utc::now();
    history.record("svc", result(HealthStatus::Unhealthy, now, 5.0));
    history.record("svc", result(HealthStatus::Healthy, now, 5.0));
    history.record("svc", result(HealthStatus::Unhealthy, now, 5.0));
    history.record("svc", result(HealthStatus::Degraded, now, 5.0));
    assert_eq!(history.consecutive_failures("svc"), 2);
    assert_eq!(history.consecutive_failures("other"), 0);
}
