// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator client: thin subcommands over the daemon's HTTP surface.

use clap::Subcommand;
use serde_json::{json, Value};

/// Operator verbs; each maps onto one control-surface endpoint.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Queue a prompt for assignment.
    Submit {
        /// Prompt text.
        text: String,
        /// Higher runs first.
        #[arg(long, default_value_t = 0)]
        priority: i64,
        /// Pin to an exact session name.
        #[arg(long)]
        target: Option<String>,
        /// Preferred provider (claude, codex, ollama, comet).
        #[arg(long)]
        provider: Option<String>,
        /// Providers to fall back to, in order.
        #[arg(long, value_delimiter = ',')]
        fallback: Vec<String>,
        /// Completion timeout in seconds.
        #[arg(long)]
        timeout: Option<i64>,
        #[arg(long, default_value = "terminal")]
        source: String,
    },
    /// List prompts.
    Prompts {
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// List registered sessions.
    Sessions,
    /// Retry a failed prompt.
    Retry { id: i64 },
    /// Retry every eligible failed prompt.
    RetryAll,
    /// Move a prompt back to pending with a new hard target.
    Reassign {
        id: i64,
        #[arg(long)]
        to: String,
    },
    /// Cancel a pending or assigned prompt.
    Cancel { id: i64 },
    /// Delete old completed/cancelled prompts.
    Clear {
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
    /// Start a managed service.
    Start { service: String },
    /// Stop a managed service.
    Stop { service: String },
    /// Restart a managed service (also resets a fatal one).
    Restart { service: String },
    /// Supervisor status for every managed service.
    Status,
    /// Cluster status: roles, nodes, health.
    Cluster,
    /// Probe a cluster node's host for coarse system facts.
    Probe { node: String },
    /// Re-read the configuration file.
    Reload,
    /// Gracefully stop the daemon.
    Shutdown,
}

/// Execute one operator command against a running daemon. Returns the
/// process exit code.
pub fn run(url: &str, command: &Command) -> i32 {
    match execute(url, command) {
        Ok(body) => {
            match serde_json::to_string_pretty(&body) {
                Ok(rendered) => println!("{rendered}"),
                Err(_) => println!("{body}"),
            }
            0
        }
        Err(CommandError::Api { kind, message }) => {
            eprintln!("error: {kind}: {message}");
            exit_code_for(&kind)
        }
        Err(CommandError::Transport(message)) => {
            eprintln!("error: {message}");
            1
        }
    }
}

enum CommandError {
    Api { kind: String, message: String },
    Transport(String),
}

fn exit_code_for(kind: &str) -> i32 {
    match kind {
        "not_found" => 2,
        "config" => 3,
        _ => 1,
    }
}

fn execute(url: &str, command: &Command) -> Result<Value, CommandError> {
    let client = reqwest::blocking::Client::new();
    let request = match command {
        Command::Submit { text, priority, target, provider, fallback, timeout, source } => {
            client.post(format!("{url}/api/v1/prompts")).json(&json!({
                "content": text,
                "priority": priority,
                "target_session": target,
                "target_provider": provider,
                "fallback_providers": fallback,
                "timeout_secs": timeout,
                "source": source,
            }))
        }
        Command::Prompts { status, limit } => {
            let mut request = client.get(format!("{url}/api/v1/prompts"));
            if let Some(status) = status {
                request = request.query(&[("status", status)]);
            }
            request.query(&[("limit", limit)])
        }
        Command::Sessions => client.get(format!("{url}/api/v1/sessions")),
        Command::Retry { id } => client.post(format!("{url}/api/v1/prompts/{id}/retry")),
        Command::RetryAll => client.post(format!("{url}/api/v1/prompts/retry_all")),
        Command::Reassign { id, to } => client
            .post(format!("{url}/api/v1/prompts/{id}/reassign"))
            .json(&json!({ "target_session": to })),
        Command::Cancel { id } => client.post(format!("{url}/api/v1/prompts/{id}/cancel")),
        Command::Clear { days } => {
            client.post(format!("{url}/api/v1/prompts/clear")).json(&json!({ "days": days }))
        }
        Command::Start { service } => {
            client.post(format!("{url}/api/v1/services/{service}/start"))
        }
        Command::Stop { service } => client.post(format!("{url}/api/v1/services/{service}/stop")),
        Command::Restart { service } => {
            client.post(format!("{url}/api/v1/services/{service}/restart"))
        }
        Command::Status => client.get(format!("{url}/api/v1/services")),
        Command::Cluster => client.get(format!("{url}/api/v1/cluster")),
        Command::Probe { node } => client.post(format!("{url}/api/v1/cluster/probe/{node}")),
        Command::Reload => client.post(format!("{url}/api/v1/reload")),
        Command::Shutdown => client.post(format!("{url}/api/v1/shutdown")),
    };

    let response = request.send().map_err(|e| CommandError::Transport(e.to_string()))?;
    let body: Value = response.json().map_err(|e| CommandError::Transport(e.to_string()))?;

    if body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
        Ok(body)
    } else {
        let kind = body
            .pointer("/error/kind")
            .and_then(Value::as_str)
            .unwrap_or("transport")
            .to_owned();
        let message = body
            .pointer("/error/message")
            .and_then(Value::as_str)
            .unwrap_or("request failed")
            .to_owned();
        Err(CommandError::Api { kind, message })
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
