// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::ErrorKind;

const SAMPLE: &str = r#"
[database]
path = "/var/lib/warden/warden.db"

[supervisor]
check_interval_secs = 20
log_directory = "/var/log/warden"
pid_directory = "/run/warden"

[[service]]
id = "dashboard"
command = "/usr/bin/python3"
args = ["-m", "dashboard"]
priority = 10
environment = { PORT = "8080" }

[service.restart_policy]
max_retries = 4
retry_delay_secs = 2
backoff_multiplier = 3.0
max_backoff_secs = 60

[service.resource_limits]
max_cpu_percent = 75.0
max_memory_mb = 512

[service.health_check]
type = "http"
endpoint = "http://localhost:8080/health"
expected_status = 200
max_failures = 2

[service.health_check.fallback]
port = 8080

[[service]]
id = "scraper"
command = "/usr/bin/scraper"
enabled = false

[cluster]
node_id = "mac-studio"
role = "failover"
host = "10.0.0.2"
port = 5051
failover_threshold_secs = 45

[[cluster.peer]]
node_id = "mac-mini"
role = "primary"
host = "10.0.0.1"
port = 5051
services = ["ollama"]

[assigner]
tick_interval_secs = 3
excluded_sessions = ["architect", "arch_dev"]
default_max_retries = 2

[assigner.providers.claude]
idle = ["? for shortcuts", { pattern = '^❯\s*$', regex = true }]
busy = ["thinking", "composing"]

[remote]
idle_timeout_secs = 120

[resources]
shareable_types = ["ollama"]

[notifications]
webhook_url = "http://localhost:8080/api/alerts"
"#;

fn parse(raw: &str) -> Result<FileConfig> {
    let config: FileConfig = toml::from_str(raw).map_err(|e| Error::config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

#[test]
fn full_sample_parses() {
    let config = parse(SAMPLE).unwrap();

    assert_eq!(config.supervisor.check_interval_secs, 20);
    assert_eq!(config.services.len(), 2);

    let dashboard = &config.services[0];
    assert_eq!(dashboard.id, "dashboard");
    assert_eq!(dashboard.priority, 10);
    assert_eq!(dashboard.environment.get("PORT").map(String::as_str), Some("8080"));
    assert_eq!(dashboard.restart_policy.max_retries, 4);
    assert_eq!(dashboard.restart_policy.backoff_multiplier, 3.0);
    let limits = dashboard.resource_limits.unwrap();
    assert_eq!(limits.max_memory_mb, Some(512));
    let health = dashboard.health_check.as_ref().unwrap();
    assert_eq!(health.max_failures, 2);

    assert!(!config.services[1].enabled);

    assert_eq!(config.cluster.role, "failover");
    assert_eq!(config.cluster.failover_threshold_secs, 45);
    assert_eq!(config.cluster.peers.len(), 1);
    assert_eq!(config.cluster.peers[0].services, vec!["ollama".to_owned()]);

    assert_eq!(config.assigner.tick_interval_secs, 3);
    assert_eq!(config.assigner.excluded_sessions.len(), 2);
    let claude = &config.assigner.providers["claude"];
    assert_eq!(claude.idle.len(), 2);
    assert!(matches!(claude.idle[1], MarkerPattern::Spec { regex: true, .. }));

    assert_eq!(config.remote.idle_timeout_secs, 120);
    assert_eq!(config.resources.shareable_types, vec!["ollama".to_owned()]);
    assert!(config.notifications.webhook_url.is_some());
}

#[test]
fn empty_config_uses_defaults() {
    let config = parse("").unwrap();
    assert_eq!(config.supervisor.check_interval_secs, 30);
    assert_eq!(config.cluster.heartbeat_interval_secs, 10);
    assert_eq!(config.cluster.health_check_interval_secs, 15);
    assert_eq!(config.cluster.failover_threshold_secs, 30);
    assert_eq!(config.cluster.max_missed_heartbeats, 3);
    assert_eq!(config.assigner.completion_interval_secs, 5);
    assert_eq!(config.assigner.default_max_retries, 3);
    assert!(!config.assigner.retry_on_timeout);
    assert!(config.services.is_empty());
}

#[test]
fn duplicate_service_ids_are_rejected() {
    let raw = r#"
[[service]]
id = "web"
command = "/bin/true"

[[service]]
id = "web"
command = "/bin/false"
"#;
    let err = parse(raw).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(err.message.contains("duplicate"));
}

#[test]
fn empty_command_is_rejected() {
    let raw = r#"
[[service]]
id = "web"
command = ""
"#;
    assert_eq!(parse(raw).unwrap_err().kind(), ErrorKind::Config);
}

#[test]
fn unknown_role_is_rejected() {
    let raw = r#"
[cluster]
role = "observer"
"#;
    assert_eq!(parse(raw).unwrap_err().kind(), ErrorKind::Config);
}

#[test]
fn unknown_keys_are_rejected() {
    let raw = r#"
[supervisor]
check_interval = 30
"#;
    assert!(parse(raw).is_err());
}

#[test]
fn restart_policy_defaults_apply() {
    let config = parse(
        r#"
[[service]]
id = "web"
command = "/bin/true"
"#,
    )
    .unwrap();
    let policy = &config.services[0].restart_policy;
    assert_eq!(policy.max_retries, 3);
    assert_eq!(policy.retry_delay_secs, 5);
    assert_eq!(policy.backoff_multiplier, 2.0);
    assert_eq!(policy.max_backoff_secs, 300);

    let graceful = &config.services[0].graceful_shutdown;
    assert!(graceful.enabled);
    assert_eq!(graceful.signal, "SIGTERM");
}
