// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Store;
use crate::error::{Error, Result};

/// Worker implementation fronting a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Provider {
    Claude,
    Codex,
    Ollama,
    Comet,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Ollama => "ollama",
            Self::Comet => "comet",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "claude" => Ok(Self::Claude),
            "codex" => Ok(Self::Codex),
            "ollama" => Ok(Self::Ollama),
            "comet" => Ok(Self::Comet),
            other => Err(Error::config(format!("unknown provider: {other}"))),
        }
    }
}

/// Observed state of a terminal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Busy,
    WaitingInput,
    Unknown,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::WaitingInput => "waiting_input",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One registered terminal session.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SessionRecord {
    pub name: String,
    pub status: SessionStatus,
    pub provider: Provider,
    pub last_activity: DateTime<Utc>,
    pub current_task_id: Option<i64>,
    pub working_dir: Option<String>,
    pub last_output: Option<String>,
    pub excluded: bool,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    /// Register a session or refresh its provider/working directory.
    /// Status and task linkage of an existing row are left untouched.
    pub async fn upsert_session(
        &self,
        name: &str,
        provider: Provider,
        working_dir: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (name, status, provider, last_activity, working_dir, updated_at)
            VALUES (?, 'unknown', ?, ?, ?, ?)
            ON CONFLICT (name) DO UPDATE SET
                provider = excluded.provider,
                working_dir = COALESCE(excluded.working_dir, sessions.working_dir),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(provider)
        .bind(now)
        .bind(working_dir)
        .bind(now)
        .execute(self.write_pool())
        .await?;
        Ok(())
    }

    pub async fn get_session(&self, name: &str) -> Result<SessionRecord> {
        sqlx::query_as::<_, SessionRecord>("SELECT * FROM sessions WHERE name = ?")
            .bind(name)
            .fetch_optional(self.read_pool())
            .await?
            .ok_or_else(|| Error::not_found(format!("session {name}")))
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        Ok(sqlx::query_as::<_, SessionRecord>("SELECT * FROM sessions ORDER BY name")
            .fetch_all(self.read_pool())
            .await?)
    }

    /// Idle, non-excluded sessions: the matcher's candidate pool.
    pub async fn idle_sessions(&self) -> Result<Vec<SessionRecord>> {
        Ok(sqlx::query_as::<_, SessionRecord>(
            "SELECT * FROM sessions WHERE status = 'idle' AND excluded = 0 ORDER BY name",
        )
        .fetch_all(self.read_pool())
        .await?)
    }

    /// Sessions with a task in flight, for the completion sweep.
    pub async fn busy_sessions(&self) -> Result<Vec<SessionRecord>> {
        Ok(sqlx::query_as::<_, SessionRecord>(
            "SELECT * FROM sessions WHERE current_task_id IS NOT NULL ORDER BY name",
        )
        .fetch_all(self.read_pool())
        .await?)
    }

    /// Record an observation from the terminal classifier. Does not touch
    /// task linkage; assignment and completion own that. `last_activity`
    /// moves only when the observed status actually changes, so a session
    /// sitting idle keeps aging for the load tie-break.
    pub async fn observe_session(
        &self,
        name: &str,
        status: SessionStatus,
        last_output: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET last_activity = CASE WHEN status != ?1 THEN ?2 ELSE last_activity END,
                status = ?1, last_output = COALESCE(?3, last_output), updated_at = ?2
            WHERE name = ?4
            "#,
        )
        .bind(status)
        .bind(now)
        .bind(last_output)
        .bind(name)
        .execute(self.write_pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("session {name}")));
        }
        Ok(())
    }

    pub async fn set_session_excluded(
        &self,
        name: &str,
        excluded: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE sessions SET excluded = ?, updated_at = ? WHERE name = ?")
            .bind(excluded)
            .bind(now)
            .bind(name)
            .execute(self.write_pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("session {name}")));
        }
        Ok(())
    }

}
