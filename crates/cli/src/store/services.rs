// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Store;
use crate::error::Result;

/// Persisted runtime state for one managed service.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ServiceStateRow {
    pub id: String,
    pub state: String,
    pub pid: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub restart_attempts: i64,
    pub next_restart_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ServiceMetricRow {
    pub id: i64,
    pub service_id: String,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub uptime_secs: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ServiceEvent {
    pub id: i64,
    pub service_id: String,
    pub from_state: String,
    pub to_state: String,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Store {
    pub async fn save_service_state(&self, row: &ServiceStateRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO supervisor_services
                (id, state, pid, started_at, restart_attempts, next_restart_at,
                 last_error, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                state = excluded.state,
                pid = excluded.pid,
                started_at = excluded.started_at,
                restart_attempts = excluded.restart_attempts,
                next_restart_at = excluded.next_restart_at,
                last_error = excluded.last_error,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.id)
        .bind(&row.state)
        .bind(row.pid)
        .bind(row.started_at)
        .bind(row.restart_attempts)
        .bind(row.next_restart_at)
        .bind(&row.last_error)
        .bind(row.updated_at)
        .execute(self.write_pool())
        .await?;
        Ok(())
    }

    pub async fn record_service_metric(
        &self,
        service_id: &str,
        cpu_percent: f64,
        memory_mb: f64,
        uptime_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO supervisor_metrics
                (service_id, cpu_percent, memory_mb, uptime_secs, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(service_id)
        .bind(cpu_percent)
        .bind(memory_mb)
        .bind(uptime_secs)
        .bind(now)
        .execute(self.write_pool())
        .await?;
        Ok(())
    }

    pub async fn recent_service_metrics(
        &self,
        service_id: &str,
        limit: i64,
    ) -> Result<Vec<ServiceMetricRow>> {
        Ok(sqlx::query_as::<_, ServiceMetricRow>(
            "SELECT * FROM supervisor_metrics WHERE service_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(service_id)
        .bind(limit)
        .fetch_all(self.read_pool())
        .await?)
    }

    pub async fn record_service_event(
        &self,
        service_id: &str,
        from_state: &str,
        to_state: &str,
        detail: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO supervisor_events (service_id, from_state, to_state, detail, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(service_id)
        .bind(from_state)
        .bind(to_state)
        .bind(detail)
        .bind(now)
        .execute(self.write_pool())
        .await?;
        Ok(())
    }

    pub async fn service_events(&self, service_id: &str, limit: i64) -> Result<Vec<ServiceEvent>> {
        Ok(sqlx::query_as::<_, ServiceEvent>(
            "SELECT * FROM supervisor_events WHERE service_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(service_id)
        .bind(limit)
        .fetch_all(self.read_pool())
        .await?)
    }
}
