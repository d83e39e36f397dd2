// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Embedded SQLite system of record.
//!
//! Separate read/write pools: a single write connection serializes all
//! mutations (no SQLITE_BUSY between our own writers), while WAL mode lets
//! readers proceed concurrently. Every state-changing operation is a single
//! transaction; in-memory caches elsewhere must be rebuildable from here.

mod schema;

pub mod cluster;
pub mod history;
pub mod prompts;
pub mod services;
pub mod sessions;

pub use cluster::{AllocationRecord, FailoverEntry, NodeRecord};
pub use history::{HistoryAction, HistoryEntry};
pub use prompts::{NewPrompt, Prompt, PromptStatus};
pub use services::{ServiceEvent, ServiceMetricRow, ServiceStateRow};
pub use sessions::{Provider, SessionRecord, SessionStatus};

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::error::Result;

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle to the embedded database.
#[derive(Clone)]
pub struct Store {
    read: SqlitePool,
    write: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database at `path` and apply the schema.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);

        let write = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await?;
        let read = SqlitePoolOptions::new().max_connections(4).connect_with(options).await?;

        let store = Self { read, write };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in schema::STATEMENTS {
            sqlx::query(statement).execute(&self.write).await?;
        }
        Ok(())
    }

    pub(crate) fn read_pool(&self) -> &SqlitePool {
        &self.read
    }

    pub(crate) fn write_pool(&self) -> &SqlitePool {
        &self.write
    }

    pub async fn close(&self) {
        self.write.close().await;
        self.read.close().await;
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
