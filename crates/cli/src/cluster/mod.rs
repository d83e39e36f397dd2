// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster coordination: per-node role, heartbeat liveness, automatic
//! failover promotion, and the shared resource-allocation registry.
//!
//! The in-memory node table is a cache over `cluster_nodes`; it is rebuilt
//! from the store at startup and persisted on every mutation. Callbacks are
//! always invoked outside the table lock.

pub mod allocation;
pub mod failover;
pub mod heartbeat;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::TimeDelta;
use parking_lot::{Mutex as SyncMutex, RwLock};
use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::{info, warn};

use crate::clock::SharedClock;
use crate::config::ClusterConfig;
use crate::error::{Error, Result};
use crate::notify::Notifier;
use crate::store::{NodeRecord, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Primary,
    Failover,
    Worker,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Failover => "failover",
            Self::Worker => "worker",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "primary" => Ok(Self::Primary),
            "failover" => Ok(Self::Failover),
            "worker" => Ok(Self::Worker),
            other => Err(Error::config(format!("unknown cluster role: {other}"))),
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived, whole-cluster health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterState {
    Healthy,
    Degraded,
    Failover,
    Split,
}

/// Heartbeat body POSTed by workers to the primary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    pub node_id: String,
    pub role: NodeRole,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterStatus {
    pub node_id: String,
    pub role: NodeRole,
    pub cluster_state: ClusterState,
    pub primary_node_id: Option<String>,
    pub nodes: Vec<NodeRecord>,
}

type FailoverCallback = Arc<dyn Fn(Option<&str>, &str) + Send + Sync>;
type RoleChangeCallback = Arc<dyn Fn(NodeRole) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    on_failover: Vec<FailoverCallback>,
    on_role_change: Vec<RoleChangeCallback>,
}

pub struct Coordinator {
    node_id: String,
    role: RwLock<NodeRole>,
    config: ClusterConfig,
    store: Store,
    nodes: RwLock<HashMap<String, NodeRecord>>,
    cluster_state: RwLock<ClusterState>,
    primary_id: RwLock<Option<String>>,
    callbacks: SyncMutex<Callbacks>,
    shareable_types: Vec<String>,
    clock: SharedClock,
    notifier: Notifier,
    client: reqwest::Client,
    system: SyncMutex<System>,
    missed_acks: SyncMutex<u32>,
}

impl Coordinator {
    pub async fn new(
        config: ClusterConfig,
        shareable_types: Vec<String>,
        store: Store,
        notifier: Notifier,
        clock: SharedClock,
    ) -> Result<Arc<Self>> {
        let role = NodeRole::parse(&config.role)?;
        let coordinator = Arc::new(Self {
            node_id: config.node_id.clone(),
            role: RwLock::new(role),
            config,
            store,
            nodes: RwLock::new(HashMap::new()),
            cluster_state: RwLock::new(ClusterState::Healthy),
            primary_id: RwLock::new(None),
            callbacks: SyncMutex::new(Callbacks::default()),
            shareable_types,
            clock,
            notifier,
            client: reqwest::Client::new(),
            system: SyncMutex::new(System::new()),
            missed_acks: SyncMutex::new(0),
        });

        coordinator.bootstrap().await?;
        Ok(coordinator)
    }

    /// Rebuild the node table: persisted rows first, then config peers,
    /// then self.
    async fn bootstrap(&self) -> Result<()> {
        let persisted = self.store.load_nodes().await?;
        let now = self.clock.utc();

        {
            let mut nodes = self.nodes.write();
            for node in persisted {
                nodes.insert(node.node_id.clone(), node);
            }
            for peer in &self.config.peers {
                nodes.entry(peer.node_id.clone()).or_insert_with(|| NodeRecord {
                    node_id: peer.node_id.clone(),
                    role: peer.role.clone(),
                    host: peer.host.clone(),
                    port: peer.port,
                    last_heartbeat: None,
                    cpu_usage: 0.0,
                    memory_usage: 0.0,
                    disk_usage: 0.0,
                    is_reachable: false,
                    is_healthy: false,
                    services: peer.services.clone(),
                });
            }
            nodes.insert(
                self.node_id.clone(),
                NodeRecord {
                    node_id: self.node_id.clone(),
                    role: self.role.read().as_str().to_owned(),
                    host: self.config.host.clone(),
                    port: self.config.port,
                    last_heartbeat: Some(now),
                    cpu_usage: 0.0,
                    memory_usage: 0.0,
                    disk_usage: 0.0,
                    is_reachable: true,
                    is_healthy: true,
                    services: Vec::new(),
                },
            );
        }

        let primary = {
            let nodes = self.nodes.read();
            nodes.values().find(|n| n.role == "primary").map(|n| n.node_id.clone())
        };
        *self.primary_id.write() = primary;

        self.persist_all().await;
        info!(node = %self.node_id, role = %self.role.read(), "cluster coordinator ready");
        Ok(())
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn role(&self) -> NodeRole {
        *self.role.read()
    }

    pub fn is_active_primary(&self) -> bool {
        self.role() == NodeRole::Primary
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn on_failover(&self, callback: impl Fn(Option<&str>, &str) + Send + Sync + 'static) {
        self.callbacks.lock().on_failover.push(Arc::new(callback));
    }

    pub fn on_role_change(&self, callback: impl Fn(NodeRole) + Send + Sync + 'static) {
        self.callbacks.lock().on_role_change.push(Arc::new(callback));
    }

    /// Accept a heartbeat from a known node. Unknown nodes are rejected
    /// with `NotFound` (HTTP 404 at the wire).
    pub async fn receive_heartbeat(&self, payload: &HeartbeatPayload) -> Result<()> {
        let updated = {
            let mut nodes = self.nodes.write();
            match nodes.get_mut(&payload.node_id) {
                Some(node) => {
                    node.last_heartbeat = Some(payload.timestamp);
                    node.cpu_usage = payload.cpu_usage;
                    node.memory_usage = payload.memory_usage;
                    node.disk_usage = payload.disk_usage;
                    node.is_reachable = true;
                    node.is_healthy = true;
                    Some(node.clone())
                }
                None => None,
            }
        };

        match updated {
            Some(node) => {
                self.store.save_node(&node, self.clock.utc()).await?;
                Ok(())
            }
            None => Err(Error::not_found(format!("node {}", payload.node_id))),
        }
    }

    pub async fn add_node(
        &self,
        node_id: &str,
        role: NodeRole,
        host: &str,
        port: u16,
        services: Vec<String>,
    ) -> Result<NodeRecord> {
        let node = NodeRecord {
            node_id: node_id.to_owned(),
            role: role.as_str().to_owned(),
            host: host.to_owned(),
            port,
            last_heartbeat: None,
            cpu_usage: 0.0,
            memory_usage: 0.0,
            disk_usage: 0.0,
            is_reachable: false,
            is_healthy: false,
            services,
        };
        self.nodes.write().insert(node_id.to_owned(), node.clone());
        self.store.save_node(&node, self.clock.utc()).await?;
        info!(node = node_id, role = %role, "node added");
        Ok(node)
    }

    pub async fn remove_node(&self, node_id: &str) -> Result<()> {
        if node_id == self.node_id {
            return Err(Error::invalid_state("cannot remove self from cluster"));
        }
        if self.nodes.write().remove(node_id).is_none() {
            return Err(Error::not_found(format!("node {node_id}")));
        }
        self.store.delete_node(node_id).await?;
        info!(node = node_id, "node removed");
        Ok(())
    }

    pub fn status(&self) -> ClusterStatus {
        let nodes = self.nodes.read();
        let mut list: Vec<NodeRecord> = nodes.values().cloned().collect();
        list.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        ClusterStatus {
            node_id: self.node_id.clone(),
            role: self.role(),
            cluster_state: *self.cluster_state.read(),
            primary_node_id: self.primary_id.read().clone(),
            nodes: list,
        }
    }

    /// P6: a node is healthy only while its heartbeat is younger than
    /// `max_missed_heartbeats · heartbeat_interval`.
    pub(crate) fn heartbeat_deadline(&self) -> TimeDelta {
        TimeDelta::seconds(
            (self.config.heartbeat_interval_secs * u64::from(self.config.max_missed_heartbeats))
                as i64,
        )
    }

    pub(crate) async fn persist_all(&self) {
        let snapshot: Vec<NodeRecord> = {
            let nodes = self.nodes.read();
            nodes.values().cloned().collect()
        };
        let now = self.clock.utc();
        for node in snapshot {
            if let Err(e) = self.store.save_node(&node, now).await {
                warn!(node = %node.node_id, "persist node: {e}");
            }
        }
    }

    /// Re-derive cluster state from node health counts.
    pub(crate) fn evaluate_cluster_state(&self) {
        let (healthy, total) = {
            let nodes = self.nodes.read();
            (nodes.values().filter(|n| n.is_healthy).count(), nodes.len())
        };
        let mut state = self.cluster_state.write();
        if *state == ClusterState::Failover {
            // Sticky until the next full recovery.
            if healthy == total {
                *state = ClusterState::Healthy;
            }
            return;
        }
        *state = if healthy == total {
            ClusterState::Healthy
        } else if healthy > 0 {
            ClusterState::Degraded
        } else {
            ClusterState::Split
        };
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
