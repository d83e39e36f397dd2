// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process supervisor: keeps the declared service set alive within advisory
//! resource limits, restarting failures with exponential backoff.
//!
//! The service table is an owning actor: every operation (cycle ticks and
//! operator verbs alike) serializes on one async mutex, so a service never
//! sees two concurrent lifecycle operations.

pub mod cycle;
pub mod metrics;
pub mod service;

pub use metrics::MetricSnapshot;
pub use service::{backoff_delay, ServiceRuntime, ServiceState};

use std::process::Stdio;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex as SyncMutex;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::clock::SharedClock;
use crate::config::{ServiceConfig, SupervisorConfig};
use crate::error::{Error, Result};
use crate::health::{CheckHistory, HealthStatus, Prober};
use crate::notify::{Notifier, Severity};
use crate::store::Store;

/// How long a child must stay up before `starting` settles into `running`.
const DEFAULT_START_GRACE: Duration = Duration::from_secs(1);

/// Wait after SIGKILL for the child to be reaped.
const KILL_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, serde::Serialize)]
pub struct ServiceStatus {
    pub id: String,
    pub state: ServiceState,
    pub pid: Option<u32>,
    pub uptime_secs: u64,
    pub restart_attempts: u32,
    pub next_restart_in_secs: Option<u64>,
    pub last_error: Option<String>,
    pub cpu_percent: f32,
    pub memory_mb: f64,
    pub total_failures: u32,
    pub health: Option<crate::health::HealthSummary>,
}

pub struct Supervisor {
    services: Mutex<Vec<ServiceRuntime>>,
    store: Store,
    prober: Prober,
    history: Arc<CheckHistory>,
    notifier: Notifier,
    clock: SharedClock,
    globals: SupervisorConfig,
    system: SyncMutex<System>,
    start_grace: Duration,
    collectors: SyncMutex<Vec<tokio::sync::mpsc::Sender<Vec<MetricSnapshot>>>>,
}

impl Supervisor {
    pub fn new(
        store: Store,
        prober: Prober,
        notifier: Notifier,
        clock: SharedClock,
        globals: SupervisorConfig,
        configs: Vec<ServiceConfig>,
    ) -> Self {
        let mut runtimes: Vec<ServiceRuntime> = configs
            .into_iter()
            .filter(|c| c.enabled)
            .map(ServiceRuntime::new)
            .collect();
        runtimes.sort_by_key(|r| r.config.priority);

        Self {
            services: Mutex::new(runtimes),
            store,
            prober,
            history: Arc::new(CheckHistory::default()),
            notifier,
            clock,
            globals,
            system: SyncMutex::new(System::new()),
            start_grace: DEFAULT_START_GRACE,
            collectors: SyncMutex::new(Vec::new()),
        }
    }

    pub fn with_start_grace(mut self, grace: Duration) -> Self {
        self.start_grace = grace;
        self
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.globals.check_interval_secs)
    }

    /// Start every managed service in priority order.
    pub async fn start_all(&self) {
        let mut services = self.services.lock().await;
        for i in 0..services.len() {
            if services[i].state == ServiceState::Stopped {
                self.spawn_service(&mut services[i]).await;
            }
        }
    }

    /// Operator start. Legal from stopped, failed, or backoff.
    pub async fn start_service(&self, id: &str) -> Result<()> {
        let mut services = self.services.lock().await;
        let runtime = find_mut(&mut services, id)?;
        match runtime.state {
            ServiceState::Stopped | ServiceState::Failed | ServiceState::Backoff => {
                self.spawn_service(runtime).await;
                Ok(())
            }
            state => {
                Err(Error::invalid_state(format!("service {id} is {state}, cannot start")))
            }
        }
    }

    /// Operator stop: configured signal, grace period, then hard kill.
    pub async fn stop_service(&self, id: &str) -> Result<()> {
        let mut services = self.services.lock().await;
        let runtime = find_mut(&mut services, id)?;
        match runtime.state {
            ServiceState::Running | ServiceState::Starting => {
                self.stop_runtime(runtime).await;
                Ok(())
            }
            ServiceState::Backoff => {
                // Cancel the pending restart.
                let from = runtime.transition(ServiceState::Stopped)?;
                runtime.next_restart_at = None;
                runtime.next_restart_wall = None;
                self.record(runtime, from, Some("restart cancelled by operator")).await;
                Ok(())
            }
            state => Err(Error::invalid_state(format!("service {id} is {state}, cannot stop"))),
        }
    }

    /// Operator restart. Also the only way out of `fatal`: resets the
    /// attempt counters and brings the service back up.
    pub async fn restart_service(&self, id: &str) -> Result<()> {
        let mut services = self.services.lock().await;
        let runtime = find_mut(&mut services, id)?;

        match runtime.state {
            ServiceState::Running | ServiceState::Starting => self.stop_runtime(runtime).await,
            ServiceState::Fatal => {
                let from = runtime.transition(ServiceState::Stopped)?;
                self.record(runtime, from, Some("fatal reset by operator")).await;
            }
            _ => {}
        }

        runtime.restart_attempts = 0;
        runtime.metrics.health_failures = 0;
        runtime.next_restart_at = None;
        runtime.next_restart_wall = None;
        if runtime.state == ServiceState::Stopped
            || runtime.state == ServiceState::Failed
            || runtime.state == ServiceState::Backoff
        {
            self.spawn_service(runtime).await;
        }
        Ok(())
    }

    pub async fn status(&self) -> Vec<ServiceStatus> {
        let services = self.services.lock().await;
        let now = self.clock.now();
        let wall = self.clock.utc();
        services
            .iter()
            .map(|r| ServiceStatus {
                id: r.config.id.clone(),
                state: r.state,
                pid: r.pid,
                uptime_secs: r.started_at.map(|t| (now - t).as_secs()).unwrap_or(0),
                restart_attempts: r.restart_attempts,
                next_restart_in_secs: r
                    .next_restart_at
                    .map(|t| t.saturating_duration_since(now).as_secs()),
                last_error: r.last_error.clone(),
                cpu_percent: r.metrics.cpu_percent,
                memory_mb: r.metrics.memory_mb,
                total_failures: r.metrics.total_failures,
                health: r
                    .config
                    .health_check
                    .as_ref()
                    .map(|_| self.history.summary(&r.config.id, 60, wall)),
            })
            .collect()
    }

    /// One supervision pass over every service, in priority order.
    pub async fn supervision_cycle(&self) {
        let mut services = self.services.lock().await;
        for i in 0..services.len() {
            self.supervise_one(&mut services[i]).await;
        }
    }

    async fn supervise_one(&self, runtime: &mut ServiceRuntime) {
        match runtime.state {
            ServiceState::Backoff => {
                let due = runtime.next_restart_at.is_some_and(|t| self.clock.now() >= t);
                if due {
                    info!(service = runtime.id(), "backoff elapsed, restarting");
                    self.spawn_service(runtime).await;
                }
            }
            ServiceState::Running => {
                if let Some(exit) = child_exited(runtime) {
                    self.on_child_death(runtime, &exit).await;
                    return;
                }
                self.refresh_metrics(runtime);
                self.check_resource_limits(runtime);
                self.run_health_check(runtime).await;
            }
            _ => {}
        }
    }

    /// stopped/failed/backoff → starting → running (or failed on early exit).
    async fn spawn_service(&self, runtime: &mut ServiceRuntime) {
        let from = match runtime.transition(ServiceState::Starting) {
            Ok(from) => from,
            Err(e) => {
                warn!(service = runtime.id(), "start skipped: {e}");
                return;
            }
        };
        self.record(runtime, from, None).await;

        match self.spawn_child(runtime) {
            Ok(child) => {
                runtime.pid = child.id();
                runtime.child = Some(child);
            }
            Err(e) => {
                runtime.last_error = Some(e.to_string());
                if let Ok(from) = runtime.transition(ServiceState::Failed) {
                    self.record(runtime, from, Some(&e.to_string())).await;
                }
                runtime.metrics.total_failures += 1;
                if runtime.config.restart_on_exit {
                    self.handle_failure(runtime).await;
                }
                return;
            }
        }

        tokio::time::sleep(self.start_grace).await;

        if let Some(exit) = child_exited(runtime) {
            let detail = format!("exited during start grace: {exit}");
            runtime.last_error = Some(detail.clone());
            runtime.pid = None;
            if let Ok(from) = runtime.transition(ServiceState::Failed) {
                self.record(runtime, from, Some(&detail)).await;
            }
            runtime.metrics.total_failures += 1;
            if runtime.config.restart_on_exit {
                self.handle_failure(runtime).await;
            }
            return;
        }

        runtime.started_at = Some(self.clock.now());
        runtime.started_wall = Some(self.clock.utc());
        runtime.metrics.health_failures = 0;
        if let Ok(from) = runtime.transition(ServiceState::Running) {
            self.record(runtime, from, None).await;
        }
        self.write_service_pid(runtime);
        info!(service = runtime.id(), pid = runtime.pid, "service started");
        self.notifier.notify(
            Severity::Info,
            "supervisor",
            Some(runtime.id()),
            format!("service started (pid {})", runtime.pid.unwrap_or(0)),
        );
    }

    fn spawn_child(&self, runtime: &ServiceRuntime) -> Result<tokio::process::Child> {
        let config = &runtime.config;
        let log_path = self.globals.log_directory.join(format!("{}.log", config.id));
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::config(format!("log dir {}: {e}", parent.display())))?;
        }
        let log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| Error::transport(format!("open {}: {e}", log_path.display())))?;
        let log_err = log
            .try_clone()
            .map_err(|e| Error::transport(format!("clone log handle: {e}")))?;

        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .envs(&config.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .process_group(0)
            .kill_on_drop(false);
        if let Some(dir) = &config.working_directory {
            command.current_dir(dir);
        }

        command.spawn().map_err(|e| Error::transport(format!("spawn {}: {e}", config.command)))
    }

    async fn on_child_death(&self, runtime: &mut ServiceRuntime, exit: &str) {
        warn!(service = runtime.id(), exit, "service is not running");
        let detail = format!("child exited: {exit}");
        runtime.last_error = Some(detail.clone());
        runtime.pid = None;
        runtime.started_at = None;
        self.remove_service_pid(runtime);
        if let Ok(from) = runtime.transition(ServiceState::Failed) {
            self.record(runtime, from, Some(&detail)).await;
        }
        runtime.metrics.total_failures += 1;

        if runtime.config.restart_on_exit {
            self.handle_failure(runtime).await;
        }
    }

    /// failed → backoff (scheduling the next attempt) or → fatal once the
    /// retry budget is spent.
    async fn handle_failure(&self, runtime: &mut ServiceRuntime) {
        let policy = runtime.config.restart_policy.clone();

        if let Some(child) = runtime.child.as_mut() {
            let _ = child.start_kill();
        }
        runtime.child = None;

        if runtime.restart_attempts >= policy.max_retries {
            if let Ok(from) = runtime.transition(ServiceState::Fatal) {
                self.record(runtime, from, Some("restart attempts exhausted")).await;
            }
            self.notifier.notify(
                Severity::Critical,
                "supervisor",
                Some(runtime.id()),
                format!("fatal: exceeded {} restart attempts", policy.max_retries),
            );
            return;
        }

        let delay = backoff_delay(&policy, runtime.restart_attempts);
        runtime.next_restart_at = Some(self.clock.now() + delay);
        runtime.next_restart_wall = Some(
            self.clock.utc()
                + chrono::TimeDelta::from_std(delay).unwrap_or_else(|_| chrono::TimeDelta::zero()),
        );
        runtime.restart_attempts += 1;
        runtime.metrics.restart_count += 1;

        if let Ok(from) = runtime.transition(ServiceState::Backoff) {
            let detail = format!("restart in {}s", delay.as_secs());
            self.record(runtime, from, Some(&detail)).await;
        }
        self.notifier.notify(
            Severity::Warning,
            "supervisor",
            Some(runtime.id()),
            format!(
                "failed, restarting in {}s (attempt {}/{})",
                delay.as_secs(),
                runtime.restart_attempts,
                policy.max_retries
            ),
        );
    }

    /// running/starting → stopping → stopped, honoring the graceful policy.
    async fn stop_runtime(&self, runtime: &mut ServiceRuntime) {
        let from = match runtime.transition(ServiceState::Stopping) {
            Ok(from) => from,
            Err(e) => {
                warn!(service = runtime.id(), "stop skipped: {e}");
                return;
            }
        };
        self.record(runtime, from, None).await;

        let graceful = runtime.config.graceful_shutdown.clone();
        if let Some(mut child) = runtime.child.take() {
            let stopped_gracefully = if graceful.enabled {
                let sig = Signal::from_str(&graceful.signal).unwrap_or(Signal::SIGTERM);
                if let Some(pid) = runtime.pid {
                    let _ = signal::kill(Pid::from_raw(pid as i32), sig);
                }
                tokio::time::timeout(Duration::from_secs(graceful.timeout_secs), child.wait())
                    .await
                    .is_ok()
            } else {
                false
            };

            if !stopped_gracefully {
                warn!(service = runtime.id(), "graceful stop failed, killing");
                let _ = child.start_kill();
                let _ = tokio::time::timeout(KILL_WAIT, child.wait()).await;
            }
        }

        runtime.pid = None;
        runtime.started_at = None;
        runtime.started_wall = None;
        self.remove_service_pid(runtime);
        if let Ok(from) = runtime.transition(ServiceState::Stopped) {
            self.record(runtime, from, None).await;
        }
        info!(service = runtime.id(), "service stopped");
    }

    fn refresh_metrics(&self, runtime: &mut ServiceRuntime) {
        let Some(pid) = runtime.pid else { return };
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sysinfo::Pid::from_u32(pid)]),
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );
        if let Some(process) = system.process(sysinfo::Pid::from_u32(pid)) {
            runtime.metrics.cpu_percent = process.cpu_usage();
            runtime.metrics.memory_mb = process.memory() as f64 / (1024.0 * 1024.0);
        }
        if let Some(started) = runtime.started_at {
            runtime.metrics.uptime_secs = (self.clock.now() - started).as_secs();
        }
    }

    /// Limits are advisory: exceeding one raises a warning, never a restart.
    fn check_resource_limits(&self, runtime: &ServiceRuntime) {
        let Some(limits) = runtime.config.resource_limits else { return };

        if let Some(max_cpu) = limits.max_cpu_percent {
            if runtime.metrics.cpu_percent > max_cpu {
                self.notifier.notify(
                    Severity::Warning,
                    "supervisor",
                    Some(runtime.id()),
                    format!(
                        "cpu {:.1}% exceeds limit {max_cpu:.1}%",
                        runtime.metrics.cpu_percent
                    ),
                );
            }
        }
        if let Some(max_memory) = limits.max_memory_mb {
            if runtime.metrics.memory_mb > max_memory as f64 {
                self.notifier.notify(
                    Severity::Warning,
                    "supervisor",
                    Some(runtime.id()),
                    format!(
                        "rss {:.1}MB exceeds limit {max_memory}MB",
                        runtime.metrics.memory_mb
                    ),
                );
            }
        }
    }

    async fn run_health_check(&self, runtime: &mut ServiceRuntime) {
        let Some(check) = runtime.config.health_check.clone() else { return };

        let result = self.prober.evaluate(&check.check, runtime.pid).await;
        let status = result.status;
        self.history.record(runtime.id(), result);

        if status == HealthStatus::Healthy {
            runtime.metrics.health_failures = 0;
            return;
        }

        runtime.metrics.health_failures += 1;
        warn!(
            service = runtime.id(),
            failures = runtime.metrics.health_failures,
            "health check failed"
        );
        if runtime.metrics.health_failures >= check.max_failures {
            let detail =
                format!("{} consecutive health-check failures", runtime.metrics.health_failures);
            runtime.last_error = Some(detail.clone());
            if let Ok(from) = runtime.transition(ServiceState::Failed) {
                self.record(runtime, from, Some(&detail)).await;
            }
            runtime.metrics.total_failures += 1;
            runtime.metrics.health_failures = 0;
            if runtime.config.restart_on_exit {
                self.handle_failure(runtime).await;
            }
        }
    }

    /// Stop every live service, in priority order.
    pub async fn shutdown(&self) {
        info!("supervisor shutting down, stopping services");
        let mut services = self.services.lock().await;
        for i in 0..services.len() {
            if matches!(services[i].state, ServiceState::Running | ServiceState::Starting) {
                self.stop_runtime(&mut services[i]).await;
            }
        }
    }

    /// Apply a reloaded service set: drop removed services (stopping live
    /// ones), add new ones, refresh configs of the rest.
    pub async fn reload(&self, configs: Vec<ServiceConfig>) {
        let mut services = self.services.lock().await;

        let keep: std::collections::HashSet<&str> =
            configs.iter().filter(|c| c.enabled).map(|c| c.id.as_str()).collect();
        for i in 0..services.len() {
            if !keep.contains(services[i].id())
                && matches!(services[i].state, ServiceState::Running | ServiceState::Starting)
            {
                self.stop_runtime(&mut services[i]).await;
            }
        }
        services.retain(|r| keep.contains(r.id()));

        for config in configs.into_iter().filter(|c| c.enabled) {
            match services.iter_mut().find(|r| r.config.id == config.id) {
                Some(existing) => existing.config = config,
                None => services.push(ServiceRuntime::new(config)),
            }
        }
        services.sort_by_key(|r| r.config.priority);

        for i in 0..services.len() {
            if services[i].state == ServiceState::Stopped {
                self.spawn_service(&mut services[i]).await;
            }
        }
    }

    async fn record(&self, runtime: &ServiceRuntime, from: ServiceState, detail: Option<&str>) {
        let now = self.clock.utc();
        if let Err(e) = self.store.save_service_state(&runtime.state_row(now)).await {
            warn!(service = runtime.id(), "persist state: {e}");
        }
        if let Err(e) = self
            .store
            .record_service_event(
                runtime.id(),
                from.as_str(),
                runtime.state.as_str(),
                detail,
                now,
            )
            .await
        {
            warn!(service = runtime.id(), "persist event: {e}");
        }
    }

    fn write_service_pid(&self, runtime: &ServiceRuntime) {
        let Some(pid) = runtime.pid else { return };
        let dir = &self.globals.pid_directory;
        if std::fs::create_dir_all(dir).is_ok() {
            let _ = std::fs::write(dir.join(format!("{}.pid", runtime.id())), pid.to_string());
        }
    }

    fn remove_service_pid(&self, runtime: &ServiceRuntime) {
        let _ = std::fs::remove_file(
            self.globals.pid_directory.join(format!("{}.pid", runtime.id())),
        );
    }
}

fn find_mut<'a>(services: &'a mut [ServiceRuntime], id: &str) -> Result<&'a mut ServiceRuntime> {
    services
        .iter_mut()
        .find(|r| r.config.id == id)
        .ok_or_else(|| Error::not_found(format!("service {id}")))
}

fn child_exited(runtime: &mut ServiceRuntime) -> Option<String> {
    let child = runtime.child.as_mut()?;
    match child.try_wait() {
        Ok(Some(status)) => {
            runtime.child = None;
            Some(status.to_string())
        }
        Ok(None) => None,
        Err(e) => {
            runtime.child = None;
            Some(format!("wait failed: {e}"))
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
