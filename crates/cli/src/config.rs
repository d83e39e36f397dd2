// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::health::CheckSpec;

/// Task-dispatch and process-supervision daemon for terminal AI workers.
#[derive(Debug, Clone, Parser)]
#[command(name = "warden", version, about)]
pub struct Config {
    /// Path to the declarative TOML configuration file.
    #[arg(long, env = "WARDEN_CONFIG", default_value = "warden.toml")]
    pub config: PathBuf,

    /// Host address to bind the HTTP surface to.
    #[arg(long, env = "WARDEN_HOST")]
    pub host: Option<String>,

    /// HTTP port to listen on.
    #[arg(long, env = "WARDEN_PORT")]
    pub port: Option<u16>,

    /// Path to the embedded database file.
    #[arg(long, env = "WARDEN_DB")]
    pub db_path: Option<PathBuf>,

    /// Path to the daemon pid file.
    #[arg(long, env = "WARDEN_PID_FILE")]
    pub pid_file: Option<PathBuf>,

    /// Log format (json or text).
    #[arg(long, env = "WARDEN_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "WARDEN_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => return Err(Error::config(format!("unknown log format: {other}"))),
        }
        if !self.config.exists() {
            return Err(Error::config(format!(
                "config file not found: {}",
                self.config.display()
            )));
        }
        Ok(())
    }

    pub fn db_path(&self, file: &FileConfig) -> PathBuf {
        self.db_path.clone().unwrap_or_else(|| file.database.path.clone())
    }

    pub fn pid_file(&self, file: &FileConfig) -> PathBuf {
        self.pid_file
            .clone()
            .unwrap_or_else(|| file.supervisor.pid_directory.join("warden.pid"))
    }
}

/// Declarative file configuration, re-read on `reload_config`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default, rename = "service")]
    pub services: Vec<ServiceConfig>,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub assigner: AssignerConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub resources: ResourcesConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| Error::config(format!("parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for service in &self.services {
            if service.command.is_empty() {
                return Err(Error::config(format!("service {}: empty command", service.id)));
            }
            if !seen.insert(&service.id) {
                return Err(Error::config(format!("duplicate service id: {}", service.id)));
            }
        }
        self.cluster.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorConfig {
    /// Seconds between supervision cycles.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Base delay before the first restart attempt.
    #[serde(default = "default_restart_delay")]
    pub restart_delay_secs: u64,
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,
    #[serde(default = "default_pid_directory")]
    pub pid_directory: PathBuf,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            restart_delay_secs: default_restart_delay(),
            log_directory: default_log_directory(),
            pid_directory: default_pid_directory(),
        }
    }
}

/// Static configuration for one managed service.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub working_directory: Option<PathBuf>,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    /// Start order; lower starts first.
    #[serde(default = "default_service_priority")]
    pub priority: i64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub restart_on_exit: bool,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    #[serde(default)]
    pub graceful_shutdown: GracefulShutdown,
    pub resource_limits: Option<ResourceLimits>,
    pub health_check: Option<HealthCheckConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RestartPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_restart_delay")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_secs: default_restart_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GracefulShutdown {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_grace_timeout")]
    pub timeout_secs: u64,
    /// Signal name, e.g. "SIGTERM" or "SIGINT".
    #[serde(default = "default_stop_signal")]
    pub signal: String,
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_grace_timeout(),
            signal: default_stop_signal(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceLimits {
    pub max_cpu_percent: Option<f32>,
    pub max_memory_mb: Option<u64>,
}

/// Health-check spec plus the consecutive-failure trip count.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    #[serde(flatten)]
    pub check: CheckSpec,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default = "default_cluster_host")]
    pub host: String,
    #[serde(default = "default_cluster_port")]
    pub port: u16,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,
    /// Seconds the primary must stay unreachable before failover.
    #[serde(default = "default_failover_threshold")]
    pub failover_threshold_secs: u64,
    /// Seconds before a recovered primary may reclaim its role.
    #[serde(default = "default_recovery_threshold")]
    pub recovery_threshold_secs: u64,
    #[serde(default = "default_max_missed_heartbeats")]
    pub max_missed_heartbeats: u32,
    /// Other known nodes, seeded into the registry at startup.
    #[serde(default, rename = "peer")]
    pub peers: Vec<PeerConfig>,
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<()> {
        match self.role.as_str() {
            "primary" | "failover" | "worker" => Ok(()),
            other => Err(Error::config(format!("unknown cluster role: {other}"))),
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            role: default_role(),
            host: default_cluster_host(),
            port: default_cluster_port(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            health_check_interval_secs: default_health_check_interval(),
            failover_threshold_secs: default_failover_threshold(),
            recovery_threshold_secs: default_recovery_threshold(),
            max_missed_heartbeats: default_max_missed_heartbeats(),
            peers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeerConfig {
    pub node_id: String,
    pub role: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub services: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssignerConfig {
    /// Seconds between matching ticks.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Seconds between completion-detection sweeps.
    #[serde(default = "default_completion_interval")]
    pub completion_interval_secs: u64,
    /// Upper bound on prompts considered in one matching tick.
    #[serde(default = "default_match_batch_size")]
    pub match_batch_size: usize,
    /// Idle/busy/waiting markers keyed by provider tag.
    #[serde(default)]
    pub providers: HashMap<String, ProviderMarkers>,
    /// Sessions permanently excluded from matching.
    #[serde(default)]
    pub excluded_sessions: Vec<String>,
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
    /// Default per-prompt completion timeout.
    #[serde(default = "default_prompt_timeout")]
    pub default_timeout_secs: u64,
    /// Automatically re-queue timed-out prompts while retries remain.
    #[serde(default)]
    pub retry_on_timeout: bool,
    /// Bytes of scrollback captured per completion sweep.
    #[serde(default = "default_capture_bytes")]
    pub capture_bytes: usize,
}

impl Default for AssignerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            completion_interval_secs: default_completion_interval(),
            match_batch_size: default_match_batch_size(),
            providers: HashMap::new(),
            excluded_sessions: Vec::new(),
            default_max_retries: default_max_retries(),
            default_timeout_secs: default_prompt_timeout(),
            retry_on_timeout: false,
            capture_bytes: default_capture_bytes(),
        }
    }
}

/// Marker lists for one provider. A pattern is a plain substring unless
/// written as `{ pattern = "...", regex = true }`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderMarkers {
    #[serde(default)]
    pub idle: Vec<MarkerPattern>,
    #[serde(default)]
    pub busy: Vec<MarkerPattern>,
    #[serde(default)]
    pub waiting: Vec<MarkerPattern>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MarkerPattern {
    Plain(String),
    Spec {
        pattern: String,
        #[serde(default)]
        regex: bool,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    /// Seconds a pooled channel may sit unused before it is closed.
    #[serde(default = "default_remote_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_remote_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_remote_idle_timeout(),
            connect_timeout_secs: default_remote_connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourcesConfig {
    /// Resource types that may hold multiple active allocations per node.
    #[serde(default)]
    pub shareable_types: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationsConfig {
    /// Optional webhook receiving notification events as JSON POSTs.
    pub webhook_url: Option<String>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("warden.db")
}

fn default_check_interval() -> u64 {
    30
}

fn default_restart_delay() -> u64 {
    5
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("/tmp/warden/logs")
}

fn default_pid_directory() -> PathBuf {
    PathBuf::from("/tmp/warden/pids")
}

fn default_service_priority() -> i64 {
    999
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_backoff() -> u64 {
    300
}

fn default_grace_timeout() -> u64 {
    30
}

fn default_stop_signal() -> String {
    "SIGTERM".to_owned()
}

fn default_max_failures() -> u32 {
    3
}

fn default_node_id() -> String {
    "node-1".to_owned()
}

fn default_role() -> String {
    "primary".to_owned()
}

fn default_cluster_host() -> String {
    "0.0.0.0".to_owned()
}

fn default_cluster_port() -> u16 {
    5051
}

fn default_heartbeat_interval() -> u64 {
    10
}

fn default_health_check_interval() -> u64 {
    15
}

fn default_failover_threshold() -> u64 {
    30
}

fn default_recovery_threshold() -> u64 {
    60
}

fn default_max_missed_heartbeats() -> u32 {
    3
}

fn default_tick_interval() -> u64 {
    2
}

fn default_completion_interval() -> u64 {
    5
}

fn default_match_batch_size() -> usize {
    64
}

fn default_prompt_timeout() -> u64 {
    3600
}

fn default_capture_bytes() -> usize {
    65536
}

fn default_remote_idle_timeout() -> u64 {
    300
}

fn default_remote_connect_timeout() -> u64 {
    10
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
