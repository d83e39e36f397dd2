// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only assignment audit trail. Rows are never updated or deleted
//! while their prompt exists; readers order by (prompt_id, id).

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use std::fmt;

use super::Store;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum HistoryAction {
    Assigned,
    Reassigned,
    Retried,
    Completed,
    Failed,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assigned => "assigned",
            Self::Reassigned => "reassigned",
            Self::Retried => "retried",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct HistoryEntry {
    pub id: i64,
    pub prompt_id: i64,
    pub session_name: String,
    pub action: HistoryAction,
    pub created_at: DateTime<Utc>,
    pub details: Option<String>,
}

/// Append one audit row inside the caller's transaction.
pub(crate) async fn append(
    conn: &mut SqliteConnection,
    prompt_id: i64,
    session: &str,
    action: HistoryAction,
    details: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO assignment_history (prompt_id, session_name, action, created_at, details)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(prompt_id)
    .bind(session)
    .bind(action)
    .bind(now)
    .bind(details)
    .execute(conn)
    .await?;
    Ok(())
}

impl Store {
    pub async fn history_for_prompt(&self, prompt_id: i64) -> Result<Vec<HistoryEntry>> {
        Ok(sqlx::query_as::<_, HistoryEntry>(
            "SELECT * FROM assignment_history WHERE prompt_id = ? ORDER BY prompt_id, id",
        )
        .bind(prompt_id)
        .fetch_all(self.read_pool())
        .await?)
    }

    pub async fn history_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM assignment_history")
            .fetch_one(self.read_pool())
            .await?;
        Ok(row.0)
    }
}
