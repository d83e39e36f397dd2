// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::SystemClock;
use std::sync::Arc;

#[test]
fn destination_includes_user_when_set() {
    assert_eq!(RemoteTarget::new("box").destination(), "box");
    assert_eq!(RemoteTarget::new("box").with_user("ops").destination(), "ops@box");
}

#[test]
fn targets_hash_by_quadruple() {
    use std::collections::HashSet;
    let mut set = HashSet::new();
    set.insert(RemoteTarget::new("box").with_user("ops"));
    set.insert(RemoteTarget::new("box").with_user("ops"));
    set.insert(RemoteTarget::new("box").with_user("ops").with_port(2222));
    set.insert(RemoteTarget::new("box").with_user("other"));
    assert_eq!(set.len(), 3);
}

#[tokio::test]
async fn exec_surfaces_timeout_kind() {
    if std::process::Command::new("ssh").arg("-V").output().is_err() {
        return; // no ssh client on this machine
    }
    let executor = RemoteExecutor::new(
        Duration::from_secs(300),
        Duration::from_secs(1),
        Arc::new(SystemClock),
    );
    // Unroutable TEST-NET-1 address; ConnectTimeout is 1s but the outer
    // deadline fires first.
    let target = RemoteTarget::new("192.0.2.1");
    let err = executor
        .exec(&target, "true", Duration::from_millis(50), &std::collections::HashMap::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), crate::error::ErrorKind::Timeout);
}
