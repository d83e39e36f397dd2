// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stateless health-check evaluation plus per-service rolling history.

pub mod history;

pub use history::{CheckHistory, HealthSummary};

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;

use crate::clock::SharedClock;

/// Declarative check spec, deserialized from the service configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CheckSpec {
    Http(HttpSpec),
    Tcp(TcpSpec),
    Process,
    Script(ScriptSpec),
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSpec {
    pub endpoint: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
    pub expected_content: Option<String>,
    /// Consulted only when the HTTP call itself errors, never on an
    /// unexpected status or missing content.
    pub fallback: Option<TcpSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TcpSpec {
    #[serde(default = "default_tcp_host")]
    pub host: String,
    pub port: u16,
    #[serde(default = "default_tcp_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptSpec {
    pub path: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_script_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one check invocation.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub status: HealthStatus,
    pub response_time_ms: f64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl CheckResult {
    fn new(status: HealthStatus, elapsed_ms: f64, now: DateTime<Utc>, message: String) -> Self {
        Self {
            status,
            response_time_ms: elapsed_ms,
            timestamp: now,
            message,
            details: serde_json::Value::Null,
        }
    }
}

/// Evaluates [`CheckSpec`]s. Stateless apart from the shared HTTP client.
#[derive(Clone)]
pub struct Prober {
    client: reqwest::Client,
    clock: SharedClock,
}

impl Prober {
    pub fn new(clock: SharedClock) -> Self {
        Self { client: reqwest::Client::new(), clock }
    }

    /// Run one check. `pid` supplies the process id for `CheckSpec::Process`.
    pub async fn evaluate(&self, spec: &CheckSpec, pid: Option<u32>) -> CheckResult {
        match spec {
            CheckSpec::Http(http) => self.check_http(http).await,
            CheckSpec::Tcp(tcp) => self.check_tcp(tcp).await,
            CheckSpec::Process => self.check_process(pid),
            CheckSpec::Script(script) => self.check_script(script).await,
        }
    }

    async fn check_http(&self, spec: &HttpSpec) -> CheckResult {
        let start = self.clock.now();
        let response = self
            .client
            .get(&spec.endpoint)
            .timeout(Duration::from_secs(spec.timeout_secs))
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                // Transport-level failure: consult the TCP fallback if any.
                if let Some(fallback) = &spec.fallback {
                    return self.check_tcp(fallback).await;
                }
                let elapsed = elapsed_ms(start, self.clock.now());
                return CheckResult::new(
                    HealthStatus::Unhealthy,
                    elapsed,
                    self.clock.utc(),
                    format!("http error: {e}"),
                );
            }
        };

        let status_code = response.status().as_u16();
        let elapsed = elapsed_ms(start, self.clock.now());
        let now = self.clock.utc();

        if status_code != spec.expected_status {
            return CheckResult::new(
                HealthStatus::Unhealthy,
                elapsed,
                now,
                format!("status {status_code} != {}", spec.expected_status),
            );
        }

        if let Some(expected) = &spec.expected_content {
            let body = response.text().await.unwrap_or_default();
            if !body.contains(expected.as_str()) {
                return CheckResult::new(
                    HealthStatus::Degraded,
                    elapsed_ms(start, self.clock.now()),
                    now,
                    "expected content not found".to_owned(),
                );
            }
        }

        let status = band_for_elapsed(elapsed);
        CheckResult::new(status, elapsed, now, format!("status {status_code}"))
    }

    async fn check_tcp(&self, spec: &TcpSpec) -> CheckResult {
        let start = self.clock.now();
        let addr = format!("{}:{}", spec.host, spec.port);
        let connect = tokio::time::timeout(
            Duration::from_secs(spec.timeout_secs),
            TcpStream::connect(&addr),
        )
        .await;

        let elapsed = elapsed_ms(start, self.clock.now());
        let now = self.clock.utc();
        match connect {
            Ok(Ok(_)) => {
                CheckResult::new(HealthStatus::Healthy, elapsed, now, format!("connected {addr}"))
            }
            Ok(Err(e)) => CheckResult::new(
                HealthStatus::Unhealthy,
                elapsed,
                now,
                format!("connect {addr}: {e}"),
            ),
            Err(_) => CheckResult::new(
                HealthStatus::Unhealthy,
                elapsed,
                now,
                format!("connect {addr}: timed out after {}s", spec.timeout_secs),
            ),
        }
    }

    fn check_process(&self, pid: Option<u32>) -> CheckResult {
        use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

        let now = self.clock.utc();
        let Some(pid) = pid else {
            return CheckResult::new(HealthStatus::Unknown, 0.0, now, "no process".to_owned());
        };

        let start = self.clock.now();
        let mut sys = System::new();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[Pid::from_u32(pid)]),
            true,
            ProcessRefreshKind::everything(),
        );
        let elapsed = elapsed_ms(start, self.clock.now());

        let Some(process) = sys.process(Pid::from_u32(pid)) else {
            return CheckResult::new(
                HealthStatus::Unhealthy,
                elapsed,
                now,
                format!("process {pid} not found"),
            );
        };

        match process.status() {
            sysinfo::ProcessStatus::Zombie => CheckResult::new(
                HealthStatus::Unhealthy,
                elapsed,
                now,
                format!("process {pid} is a zombie"),
            ),
            sysinfo::ProcessStatus::Stop => CheckResult::new(
                HealthStatus::Degraded,
                elapsed,
                now,
                format!("process {pid} is stopped"),
            ),
            _ => CheckResult::new(
                HealthStatus::Healthy,
                elapsed,
                now,
                format!("process {pid} running"),
            ),
        }
    }

    async fn check_script(&self, spec: &ScriptSpec) -> CheckResult {
        let start = self.clock.now();
        let run = tokio::time::timeout(
            Duration::from_secs(spec.timeout_secs),
            tokio::process::Command::new(&spec.path).args(&spec.args).output(),
        )
        .await;

        let elapsed = elapsed_ms(start, self.clock.now());
        let now = self.clock.utc();
        match run {
            Ok(Ok(output)) => match output.status.code() {
                Some(0) => CheckResult::new(
                    HealthStatus::Healthy,
                    elapsed,
                    now,
                    "script exited 0".to_owned(),
                ),
                Some(1) => CheckResult::new(
                    HealthStatus::Degraded,
                    elapsed,
                    now,
                    "script exited 1".to_owned(),
                ),
                Some(code) => CheckResult::new(
                    HealthStatus::Unhealthy,
                    elapsed,
                    now,
                    format!("script exited {code}"),
                ),
                None => CheckResult::new(
                    HealthStatus::Unhealthy,
                    elapsed,
                    now,
                    "script killed by signal".to_owned(),
                ),
            },
            Ok(Err(e)) => CheckResult::new(
                HealthStatus::Unknown,
                elapsed,
                now,
                format!("script spawn failed: {e}"),
            ),
            Err(_) => CheckResult::new(
                HealthStatus::Unhealthy,
                elapsed,
                now,
                format!("script timed out after {}s", spec.timeout_secs),
            ),
        }
    }
}

/// Response-time bands for a successful HTTP probe.
fn band_for_elapsed(elapsed_ms: f64) -> HealthStatus {
    if elapsed_ms < 1000.0 {
        HealthStatus::Healthy
    } else if elapsed_ms < 5000.0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unhealthy
    }
}

fn elapsed_ms(start: std::time::Instant, end: std::time::Instant) -> f64 {
    end.saturating_duration_since(start).as_secs_f64() * 1000.0
}

fn default_http_timeout() -> u64 {
    10
}

fn default_expected_status() -> u16 {
    200
}

fn default_tcp_host() -> String {
    "localhost".to_owned()
}

fn default_tcp_timeout() -> u64 {
    5
}

fn default_script_timeout() -> u64 {
    30
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
