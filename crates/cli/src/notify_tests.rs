// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::SystemClock;
use std::sync::Arc;

#[tokio::test]
async fn subscribers_receive_events() {
    let notifier = Notifier::new(Arc::new(SystemClock));
    let mut rx = notifier.subscribe();

    notifier.notify(Severity::Warning, "supervisor", Some("web"), "memory limit exceeded");

    let event = rx.recv().await.unwrap();
    assert_eq!(event.severity, Severity::Warning);
    assert_eq!(event.source, "supervisor");
    assert_eq!(event.subject.as_deref(), Some("web"));
    assert_eq!(event.message, "memory limit exceeded");
}

#[tokio::test]
async fn notify_without_subscribers_does_not_block_or_fail() {
    let notifier = Notifier::new(Arc::new(SystemClock));
    notifier.notify(Severity::Critical, "cluster", None, "primary lost");
}

#[yare::parameterized(
    info = { Severity::Info, "info" },
    warning = { Severity::Warning, "warning" },
    critical = { Severity::Critical, "critical" },
)]
fn severity_strings(severity: Severity, expected: &str) {
    assert_eq!(severity.as_str(), expected);
}
