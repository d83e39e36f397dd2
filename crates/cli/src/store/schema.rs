// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema statements, applied in order on open. All timestamps are UTC
//! ISO-8601 text; enum columns hold the literal lowercase strings.

pub const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS prompts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        content TEXT NOT NULL,
        source TEXT NOT NULL DEFAULT 'api',
        priority INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'pending',
        assigned_session TEXT,
        target_session TEXT,
        target_provider TEXT,
        fallback_providers TEXT NOT NULL DEFAULT '[]',
        retry_count INTEGER NOT NULL DEFAULT 0,
        max_retries INTEGER NOT NULL DEFAULT 3,
        timeout_secs INTEGER NOT NULL DEFAULT 3600,
        created_at TEXT NOT NULL,
        assigned_at TEXT,
        completed_at TEXT,
        response TEXT,
        error TEXT,
        metadata TEXT
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_prompts_status_priority
        ON prompts (status, priority DESC, created_at ASC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        name TEXT PRIMARY KEY,
        status TEXT NOT NULL DEFAULT 'unknown',
        provider TEXT NOT NULL,
        last_activity TEXT NOT NULL,
        current_task_id INTEGER REFERENCES prompts (id),
        working_dir TEXT,
        last_output TEXT,
        excluded INTEGER NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS assignment_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        prompt_id INTEGER NOT NULL REFERENCES prompts (id),
        session_name TEXT NOT NULL,
        action TEXT NOT NULL,
        created_at TEXT NOT NULL,
        details TEXT
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_history_prompt
        ON assignment_history (prompt_id, id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cluster_nodes (
        node_id TEXT PRIMARY KEY,
        role TEXT NOT NULL,
        host TEXT NOT NULL,
        port INTEGER NOT NULL,
        last_heartbeat TEXT,
        cpu_usage REAL NOT NULL DEFAULT 0,
        memory_usage REAL NOT NULL DEFAULT 0,
        disk_usage REAL NOT NULL DEFAULT 0,
        is_reachable INTEGER NOT NULL DEFAULT 0,
        is_healthy INTEGER NOT NULL DEFAULT 0,
        services TEXT NOT NULL DEFAULT '[]',
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS resource_allocations (
        id TEXT PRIMARY KEY,
        resource_type TEXT NOT NULL,
        requester TEXT NOT NULL,
        node_id TEXT NOT NULL,
        priority INTEGER NOT NULL DEFAULT 0,
        allocated_at TEXT NOT NULL,
        released_at TEXT
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_allocations_active
        ON resource_allocations (resource_type, node_id)
        WHERE released_at IS NULL
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS failover_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event_type TEXT NOT NULL,
        from_node TEXT,
        to_node TEXT NOT NULL,
        reason TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS supervisor_services (
        id TEXT PRIMARY KEY,
        state TEXT NOT NULL,
        pid INTEGER,
        started_at TEXT,
        restart_attempts INTEGER NOT NULL DEFAULT 0,
        next_restart_at TEXT,
        last_error TEXT,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS supervisor_metrics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        service_id TEXT NOT NULL,
        cpu_percent REAL NOT NULL,
        memory_mb REAL NOT NULL,
        uptime_secs INTEGER NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS supervisor_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        service_id TEXT NOT NULL,
        from_state TEXT NOT NULL,
        to_state TEXT NOT NULL,
        detail TEXT,
        created_at TEXT NOT NULL
    )
    "#,
];
