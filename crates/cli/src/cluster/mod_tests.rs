// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::{Clock, ManualClock};
use crate::config::{ClusterConfig, PeerConfig};
use crate::store::Store;
use chrono::Utc;

pub(super) struct Fixture {
    pub coordinator: Arc<Coordinator>,
    pub clock: Arc<ManualClock>,
    pub store: Store,
    pub _dir: tempfile::TempDir,
}

pub(super) async fn fixture(role: &str, peers: Vec<PeerConfig>) -> Fixture {
    fixture_with(role, peers, Vec::new()).await
}

pub(super) async fn fixture_with(
    role: &str,
    peers: Vec<PeerConfig>,
    shareable: Vec<String>,
) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&dir.path().join("warden.db")).await.unwrap();
    let clock = Arc::new(ManualClock::new());
    let shared: crate::clock::SharedClock = clock.clone();

    let config = ClusterConfig {
        node_id: "self".to_owned(),
        role: role.to_owned(),
        host: "127.0.0.1".to_owned(),
        port: 5051,
        peers,
        ..ClusterConfig::default()
    };
    let coordinator = Coordinator::new(
        config,
        shareable,
        store.clone(),
        crate::notify::Notifier::new(shared.clone()),
        shared,
    )
    .await
    .unwrap();

    Fixture { coordinator, clock, store, _dir: dir }
}

pub(super) fn peer(node_id: &str, role: &str, services: &[&str]) -> PeerConfig {
    PeerConfig {
        node_id: node_id.to_owned(),
        role: role.to_owned(),
        host: "127.0.0.1".to_owned(),
        // Reserved port: probes fail fast with connection refused.
        port: 1,
        services: services.iter().map(|s| (*s).to_owned()).collect(),
    }
}

pub(super) fn beat(node_id: &str, at: chrono::DateTime<Utc>) -> HeartbeatPayload {
    HeartbeatPayload {
        node_id: node_id.to_owned(),
        role: NodeRole::Worker,
        timestamp: at,
        cpu_usage: 10.0,
        memory_usage: 20.0,
        disk_usage: 30.0,
    }
}

#[tokio::test]
async fn bootstrap_registers_self_and_peers() {
    let f = fixture("primary", vec![peer("w1", "worker", &[])]).await;

    let status = f.coordinator.status();
    assert_eq!(status.role, NodeRole::Primary);
    assert_eq!(status.primary_node_id.as_deref(), Some("self"));
    let ids: Vec<&str> = status.nodes.iter().map(|n| n.node_id.as_str()).collect();
    assert_eq!(ids, vec!["self", "w1"]);

    // Everything is rebuildable from the store.
    assert_eq!(f.store.load_nodes().await.unwrap().len(), 2);
}

#[tokio::test]
async fn heartbeat_from_known_node_updates_the_record() {
    let f = fixture("primary", vec![peer("w1", "worker", &[])]).await;
    let now = f.clock.utc();

    f.coordinator.receive_heartbeat(&beat("w1", now)).await.unwrap();

    let status = f.coordinator.status();
    let w1 = status.nodes.iter().find(|n| n.node_id == "w1").unwrap();
    assert!(w1.is_healthy);
    assert_eq!(w1.cpu_usage, 10.0);
    assert_eq!(w1.last_heartbeat, Some(now));
}

#[tokio::test]
async fn heartbeat_from_unknown_node_is_not_found() {
    let f = fixture("primary", vec![]).await;
    let err = f.coordinator.receive_heartbeat(&beat("ghost", f.clock.utc())).await.unwrap_err();
    assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
}

#[tokio::test]
async fn add_and_remove_node() {
    let f = fixture("primary", vec![]).await;

    f.coordinator
        .add_node("w2", NodeRole::Worker, "10.0.0.9", 5051, vec!["ollama".to_owned()])
        .await
        .unwrap();
    assert!(f.coordinator.status().nodes.iter().any(|n| n.node_id == "w2"));

    f.coordinator.remove_node("w2").await.unwrap();
    assert!(!f.coordinator.status().nodes.iter().any(|n| n.node_id == "w2"));

    let err = f.coordinator.remove_node("self").await.unwrap_err();
    assert_eq!(err.kind(), crate::error::ErrorKind::InvalidState);
}

#[tokio::test]
async fn cluster_state_follows_health_counts() {
    let f = fixture("primary", vec![peer("w1", "worker", &[])]).await;

    // w1 has never heartbeated: degraded.
    f.coordinator.evaluate_cluster_state();
    assert_eq!(f.coordinator.status().cluster_state, ClusterState::Degraded);

    f.coordinator.receive_heartbeat(&beat("w1", f.clock.utc())).await.unwrap();
    f.coordinator.evaluate_cluster_state();
    assert_eq!(f.coordinator.status().cluster_state, ClusterState::Healthy);
}

#[test]
fn role_parse_round_trips() {
    for role in [NodeRole::Primary, NodeRole::Failover, NodeRole::Worker] {
        assert_eq!(NodeRole::parse(role.as_str()).unwrap(), role);
    }
    assert!(NodeRole::parse("observer").is_err());
}
