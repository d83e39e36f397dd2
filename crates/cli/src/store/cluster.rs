// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Store;
use crate::error::{Error, Result};

/// Persisted view of one cluster node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: String,
    pub role: String,
    pub host: String,
    pub port: u16,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    pub is_reachable: bool,
    pub is_healthy: bool,
    pub services: Vec<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct NodeRow {
    node_id: String,
    role: String,
    host: String,
    port: i64,
    last_heartbeat: Option<DateTime<Utc>>,
    cpu_usage: f64,
    memory_usage: f64,
    disk_usage: f64,
    is_reachable: bool,
    is_healthy: bool,
    services: String,
}

impl NodeRow {
    fn into_record(self) -> Result<NodeRecord> {
        let services: Vec<String> = serde_json::from_str(&self.services)
            .map_err(|e| Error::transport(format!("node {}: services: {e}", self.node_id)))?;
        Ok(NodeRecord {
            node_id: self.node_id,
            role: self.role,
            host: self.host,
            port: self.port as u16,
            last_heartbeat: self.last_heartbeat,
            cpu_usage: self.cpu_usage,
            memory_usage: self.memory_usage,
            disk_usage: self.disk_usage,
            is_reachable: self.is_reachable,
            is_healthy: self.is_healthy,
            services,
        })
    }
}

/// A reservation of a shared resource on a node. Active while
/// `released_at` is null.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AllocationRecord {
    pub id: String,
    pub resource_type: String,
    pub requester: String,
    pub node_id: String,
    pub priority: i64,
    pub allocated_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FailoverEntry {
    pub id: i64,
    pub event_type: String,
    pub from_node: Option<String>,
    pub to_node: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Store {
    pub async fn save_node(&self, node: &NodeRecord, now: DateTime<Utc>) -> Result<()> {
        let services = serde_json::to_string(&node.services)
            .map_err(|e| Error::config(format!("services list: {e}")))?;
        sqlx::query(
            r#"
            INSERT INTO cluster_nodes
                (node_id, role, host, port, last_heartbeat, cpu_usage, memory_usage,
                 disk_usage, is_reachable, is_healthy, services, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (node_id) DO UPDATE SET
                role = excluded.role,
                host = excluded.host,
                port = excluded.port,
                last_heartbeat = excluded.last_heartbeat,
                cpu_usage = excluded.cpu_usage,
                memory_usage = excluded.memory_usage,
                disk_usage = excluded.disk_usage,
                is_reachable = excluded.is_reachable,
                is_healthy = excluded.is_healthy,
                services = excluded.services,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&node.node_id)
        .bind(&node.role)
        .bind(&node.host)
        .bind(node.port as i64)
        .bind(node.last_heartbeat)
        .bind(node.cpu_usage)
        .bind(node.memory_usage)
        .bind(node.disk_usage)
        .bind(node.is_reachable)
        .bind(node.is_healthy)
        .bind(&services)
        .bind(now)
        .execute(self.write_pool())
        .await?;
        Ok(())
    }

    pub async fn load_nodes(&self) -> Result<Vec<NodeRecord>> {
        let rows = sqlx::query_as::<_, NodeRow>("SELECT * FROM cluster_nodes ORDER BY node_id")
            .fetch_all(self.read_pool())
            .await?;
        rows.into_iter().map(NodeRow::into_record).collect()
    }

    pub async fn delete_node(&self, node_id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM cluster_nodes WHERE node_id = ?")
            .bind(node_id)
            .execute(self.write_pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("node {node_id}")));
        }
        Ok(())
    }

    pub async fn append_failover(
        &self,
        event_type: &str,
        from_node: Option<&str>,
        to_node: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO failover_log (event_type, from_node, to_node, reason, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(event_type)
        .bind(from_node)
        .bind(to_node)
        .bind(reason)
        .bind(now)
        .execute(self.write_pool())
        .await?;
        Ok(())
    }

    pub async fn failover_log(&self, limit: i64) -> Result<Vec<FailoverEntry>> {
        Ok(sqlx::query_as::<_, FailoverEntry>(
            "SELECT * FROM failover_log ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.read_pool())
        .await?)
    }

    pub async fn insert_allocation(&self, allocation: &AllocationRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO resource_allocations
                (id, resource_type, requester, node_id, priority, allocated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&allocation.id)
        .bind(&allocation.resource_type)
        .bind(&allocation.requester)
        .bind(&allocation.node_id)
        .bind(allocation.priority)
        .bind(allocation.allocated_at)
        .execute(self.write_pool())
        .await?;
        Ok(())
    }

    /// Stamp `released_at`. Returns false when the allocation was already
    /// released; `NotFound` when it never existed.
    pub async fn release_allocation(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE resource_allocations SET released_at = ? WHERE id = ? AND released_at IS NULL",
        )
        .bind(now)
        .bind(id)
        .execute(self.write_pool())
        .await?;
        if updated.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM resource_allocations WHERE id = ?")
                .bind(id)
                .fetch_optional(self.read_pool())
                .await?;
        match exists {
            Some(_) => Ok(false),
            None => Err(Error::not_found(format!("allocation {id}"))),
        }
    }

    pub async fn active_allocations(
        &self,
        resource_type: Option<&str>,
        node_id: Option<&str>,
    ) -> Result<Vec<AllocationRecord>> {
        let mut sql = String::from("SELECT * FROM resource_allocations WHERE released_at IS NULL");
        if resource_type.is_some() {
            sql.push_str(" AND resource_type = ?");
        }
        if node_id.is_some() {
            sql.push_str(" AND node_id = ?");
        }
        sql.push_str(" ORDER BY allocated_at");

        let mut query = sqlx::query_as::<_, AllocationRecord>(&sql);
        if let Some(rt) = resource_type {
            query = query.bind(rt);
        }
        if let Some(node) = node_id {
            query = query.bind(node);
        }
        Ok(query.fetch_all(self.read_pool()).await?)
    }
}
