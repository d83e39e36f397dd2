// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::history::{self, HistoryAction};
use super::sessions::Provider;
use super::Store;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PromptStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl PromptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for PromptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of text work: the atomic unit of scheduling.
#[derive(Debug, Clone, Serialize)]
pub struct Prompt {
    pub id: i64,
    pub content: String,
    pub source: String,
    pub priority: i64,
    pub status: PromptStatus,
    pub assigned_session: Option<String>,
    pub target_session: Option<String>,
    pub target_provider: Option<Provider>,
    pub fallback_providers: Vec<Provider>,
    pub retry_count: i64,
    pub max_retries: i64,
    pub timeout_secs: i64,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub response: Option<String>,
    pub error: Option<String>,
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct PromptRow {
    id: i64,
    content: String,
    source: String,
    priority: i64,
    status: PromptStatus,
    assigned_session: Option<String>,
    target_session: Option<String>,
    target_provider: Option<Provider>,
    fallback_providers: String,
    retry_count: i64,
    max_retries: i64,
    timeout_secs: i64,
    created_at: DateTime<Utc>,
    assigned_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    response: Option<String>,
    error: Option<String>,
    metadata: Option<String>,
}

impl PromptRow {
    fn into_prompt(self) -> Result<Prompt> {
        let fallback_providers: Vec<Provider> = serde_json::from_str(&self.fallback_providers)
            .map_err(|e| Error::transport(format!("prompt {}: fallback list: {e}", self.id)))?;
        Ok(Prompt {
            id: self.id,
            content: self.content,
            source: self.source,
            priority: self.priority,
            status: self.status,
            assigned_session: self.assigned_session,
            target_session: self.target_session,
            target_provider: self.target_provider,
            fallback_providers,
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            timeout_secs: self.timeout_secs,
            created_at: self.created_at,
            assigned_at: self.assigned_at,
            completed_at: self.completed_at,
            response: self.response,
            error: self.error,
            metadata: self.metadata,
        })
    }
}

/// Submission payload for a new prompt.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPrompt {
    pub content: String,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub priority: i64,
    pub target_session: Option<String>,
    pub target_provider: Option<Provider>,
    #[serde(default)]
    pub fallback_providers: Vec<Provider>,
    pub max_retries: Option<i64>,
    pub timeout_secs: Option<i64>,
    pub metadata: Option<String>,
}

fn default_source() -> String {
    "api".to_owned()
}

impl Store {
    pub async fn create_prompt(
        &self,
        new: &NewPrompt,
        default_max_retries: i64,
        default_timeout_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<Prompt> {
        let fallback = serde_json::to_string(&new.fallback_providers)
            .map_err(|e| Error::config(format!("fallback list: {e}")))?;
        let result = sqlx::query(
            r#"
            INSERT INTO prompts
                (content, source, priority, status, target_session, target_provider,
                 fallback_providers, retry_count, max_retries, timeout_secs, created_at, metadata)
            VALUES (?, ?, ?, 'pending', ?, ?, ?, 0, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.content)
        .bind(&new.source)
        .bind(new.priority)
        .bind(&new.target_session)
        .bind(new.target_provider)
        .bind(&fallback)
        .bind(new.max_retries.unwrap_or(default_max_retries))
        .bind(new.timeout_secs.unwrap_or(default_timeout_secs))
        .bind(now)
        .bind(&new.metadata)
        .execute(self.write_pool())
        .await?;
        self.get_prompt(result.last_insert_rowid()).await
    }

    pub async fn get_prompt(&self, id: i64) -> Result<Prompt> {
        let row = sqlx::query_as::<_, PromptRow>("SELECT * FROM prompts WHERE id = ?")
            .bind(id)
            .fetch_optional(self.read_pool())
            .await?
            .ok_or_else(|| Error::not_found(format!("prompt {id}")))?;
        row.into_prompt()
    }

    pub async fn list_prompts(
        &self,
        status: Option<PromptStatus>,
        limit: i64,
    ) -> Result<Vec<Prompt>> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, PromptRow>(
                    "SELECT * FROM prompts WHERE status = ? ORDER BY id DESC LIMIT ?",
                )
                .bind(status)
                .bind(limit)
                .fetch_all(self.read_pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, PromptRow>("SELECT * FROM prompts ORDER BY id DESC LIMIT ?")
                    .bind(limit)
                    .fetch_all(self.read_pool())
                    .await?
            }
        };
        rows.into_iter().map(PromptRow::into_prompt).collect()
    }

    /// Pending prompts in matching order: priority descending, then FIFO.
    pub async fn pending_prompts(&self, batch: i64) -> Result<Vec<Prompt>> {
        let rows = sqlx::query_as::<_, PromptRow>(
            r#"
            SELECT * FROM prompts WHERE status = 'pending'
            ORDER BY priority DESC, created_at ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(batch)
        .fetch_all(self.read_pool())
        .await?;
        rows.into_iter().map(PromptRow::into_prompt).collect()
    }

    /// Atomically bind a pending prompt to an idle session.
    ///
    /// One transaction: prompt → assigned, session → busy with the task id,
    /// audit row appended. Fails with `InvalidState` if either side moved
    /// since the matcher looked.
    pub async fn assign_prompt(&self, id: i64, session: &str, now: DateTime<Utc>) -> Result<()> {
        let mut tx = self.write_pool().begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE prompts SET status = 'assigned', assigned_session = ?, assigned_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(session)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(Error::invalid_state(format!("prompt {id} is not pending")));
        }

        let updated = sqlx::query(
            r#"
            UPDATE sessions SET status = 'busy', current_task_id = ?, last_activity = ?, updated_at = ?
            WHERE name = ? AND status = 'idle' AND current_task_id IS NULL
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(now)
        .bind(session)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(Error::invalid_state(format!("session {session} is not idle")));
        }

        history::append(&mut tx, id, session, HistoryAction::Assigned, None, now).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Undo a failed injection: prompt → failed with the transport error and
    /// a bumped retry counter (clamped at max), session freed.
    pub async fn revert_assignment(
        &self,
        id: i64,
        session: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.write_pool().begin().await?;

        sqlx::query(
            r#"
            UPDATE prompts
            SET status = 'failed', error = ?,
                retry_count = MIN(retry_count + 1, max_retries)
            WHERE id = ? AND status = 'assigned'
            "#,
        )
        .bind(error)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE sessions SET status = 'idle', current_task_id = NULL, updated_at = ?
            WHERE name = ? AND current_task_id = ?
            "#,
        )
        .bind(now)
        .bind(session)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        history::append(&mut tx, id, session, HistoryAction::Failed, Some(error), now).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Worker acknowledgement: first busy observation after assignment.
    pub async fn mark_in_progress(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE prompts SET status = 'in_progress' WHERE id = ? AND status = 'assigned'")
            .bind(id)
            .execute(self.write_pool())
            .await?;
        Ok(())
    }

    pub async fn complete_prompt(
        &self,
        id: i64,
        session: &str,
        response: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.write_pool().begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE prompts SET status = 'completed', response = ?, completed_at = ?
            WHERE id = ? AND status IN ('assigned', 'in_progress')
            "#,
        )
        .bind(response)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(Error::invalid_state(format!("prompt {id} is not in flight")));
        }

        sqlx::query(
            r#"
            UPDATE sessions SET status = 'idle', current_task_id = NULL,
                last_activity = ?, updated_at = ?
            WHERE name = ? AND current_task_id = ?
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(session)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        history::append(&mut tx, id, session, HistoryAction::Completed, None, now).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Fail an in-flight prompt and free its session.
    pub async fn fail_prompt(
        &self,
        id: i64,
        session: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.write_pool().begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE prompts SET status = 'failed', error = ?, completed_at = ?
            WHERE id = ? AND status IN ('assigned', 'in_progress')
            "#,
        )
        .bind(error)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(Error::invalid_state(format!("prompt {id} is not in flight")));
        }

        sqlx::query(
            r#"
            UPDATE sessions SET status = 'idle', current_task_id = NULL, updated_at = ?
            WHERE name = ? AND current_task_id = ?
            "#,
        )
        .bind(now)
        .bind(session)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        history::append(&mut tx, id, session, HistoryAction::Failed, Some(error), now).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Re-queue a failed prompt. Legal only while `retry_count < max_retries`;
    /// returns false (without mutating anything) otherwise. The original
    /// `target_session` hint is kept.
    pub async fn retry_prompt(&self, id: i64, now: DateTime<Utc>) -> Result<bool> {
        let prompt = self.get_prompt(id).await?;
        if prompt.status != PromptStatus::Failed || prompt.retry_count >= prompt.max_retries {
            return Ok(false);
        }

        let mut tx = self.write_pool().begin().await?;
        let updated = sqlx::query(
            r#"
            UPDATE prompts
            SET status = 'pending', assigned_session = NULL, assigned_at = NULL,
                completed_at = NULL, error = NULL, retry_count = retry_count + 1
            WHERE id = ? AND status = 'failed' AND retry_count < max_retries
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        let session = prompt.assigned_session.as_deref().unwrap_or("");
        history::append(&mut tx, id, session, HistoryAction::Retried, None, now).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Retry every eligible failed prompt; returns how many were re-queued.
    pub async fn retry_all_failed(&self, now: DateTime<Utc>) -> Result<u64> {
        let failed = sqlx::query_as::<_, PromptRow>(
            "SELECT * FROM prompts WHERE status = 'failed' AND retry_count < max_retries",
        )
        .fetch_all(self.read_pool())
        .await?;

        let mut retried = 0;
        for row in failed {
            if self.retry_prompt(row.id, now).await? {
                retried += 1;
            }
        }
        Ok(retried)
    }

    /// Force a prompt back to pending with a new hard target. Frees any
    /// session it was occupying. Does not bump the retry counter.
    pub async fn reassign_prompt(
        &self,
        id: i64,
        new_target: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let prompt = self.get_prompt(id).await?;

        let mut tx = self.write_pool().begin().await?;
        sqlx::query(
            r#"
            UPDATE prompts
            SET status = 'pending', assigned_session = NULL, assigned_at = NULL,
                completed_at = NULL, target_session = ?
            WHERE id = ?
            "#,
        )
        .bind(new_target)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if let Some(session) = &prompt.assigned_session {
            sqlx::query(
                r#"
                UPDATE sessions SET status = 'idle', current_task_id = NULL, updated_at = ?
                WHERE name = ? AND current_task_id = ?
                "#,
            )
            .bind(now)
            .bind(session)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        let details = format!("target {new_target}");
        history::append(
            &mut tx,
            id,
            prompt.assigned_session.as_deref().unwrap_or(new_target),
            HistoryAction::Reassigned,
            Some(&details),
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Cancel a prompt that has not started producing output.
    pub async fn cancel_prompt(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        let prompt = self.get_prompt(id).await?;
        if !matches!(prompt.status, PromptStatus::Pending | PromptStatus::Assigned) {
            return Err(Error::invalid_state(format!(
                "prompt {id} is {}, not cancellable",
                prompt.status
            )));
        }

        let mut tx = self.write_pool().begin().await?;
        sqlx::query("UPDATE prompts SET status = 'cancelled', completed_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if let Some(session) = &prompt.assigned_session {
            sqlx::query(
                r#"
                UPDATE sessions SET status = 'idle', current_task_id = NULL, updated_at = ?
                WHERE name = ? AND current_task_id = ?
                "#,
            )
            .bind(now)
            .bind(session)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Retention cleanup: drop terminal prompts older than `days`, along with
    /// their audit rows. The only sanctioned deletion path; operator-initiated.
    pub async fn clear_prompts(&self, days: i64, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - TimeDelta::days(days);
        let mut tx = self.write_pool().begin().await?;

        sqlx::query(
            r#"
            DELETE FROM assignment_history WHERE prompt_id IN (
                SELECT id FROM prompts
                WHERE status IN ('completed', 'cancelled') AND created_at < ?
            )
            "#,
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        let deleted = sqlx::query(
            "DELETE FROM prompts WHERE status IN ('completed', 'cancelled') AND created_at < ?",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(deleted.rows_affected())
    }

    /// In-flight prompts whose deadline has passed, for the completion sweep.
    pub async fn expired_prompts(&self, now: DateTime<Utc>) -> Result<Vec<Prompt>> {
        let rows = sqlx::query_as::<_, PromptRow>(
            r#"
            SELECT * FROM prompts
            WHERE status IN ('assigned', 'in_progress')
              AND assigned_at IS NOT NULL
            "#,
        )
        .fetch_all(self.read_pool())
        .await?;

        let mut expired = Vec::new();
        for row in rows {
            let prompt = row.into_prompt()?;
            if let Some(assigned_at) = prompt.assigned_at {
                if now - assigned_at >= TimeDelta::seconds(prompt.timeout_secs) {
                    expired.push(prompt);
                }
            }
        }
        Ok(expired)
    }
}
