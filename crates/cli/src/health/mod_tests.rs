// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::SystemClock;
use std::sync::Arc;

fn prober() -> Prober {
    Prober::new(Arc::new(SystemClock))
}

#[yare::parameterized(
    fast = { 500.0, HealthStatus::Healthy },
    boundary_low = { 999.9, HealthStatus::Healthy },
    slow = { 1000.0, HealthStatus::Degraded },
    very_slow = { 4999.0, HealthStatus::Degraded },
    too_slow = { 5000.0, HealthStatus::Unhealthy },
)]
fn response_time_bands(ms: f64, expected: HealthStatus) {
    assert_eq!(band_for_elapsed(ms), expected);
}

#[test]
fn check_spec_deserializes_tagged() {
    let spec: CheckSpec = toml::from_str(
        r#"
        type = "http"
        endpoint = "http://localhost:8080/health"
        expected_status = 200
        expected_content = "ok"

        [fallback]
        port = 8080
        "#,
    )
    .unwrap();

    match spec {
        CheckSpec::Http(http) => {
            assert_eq!(http.endpoint, "http://localhost:8080/health");
            assert_eq!(http.expected_status, 200);
            assert_eq!(http.expected_content.as_deref(), Some("ok"));
            let fallback = http.fallback.unwrap();
            assert_eq!(fallback.host, "localhost");
            assert_eq!(fallback.port, 8080);
        }
        other => panic!("wrong variant: {other:?}"),
    }
}

#[test]
fn process_spec_deserializes() {
    let spec: CheckSpec = toml::from_str(r#"type = "process""#).unwrap();
    assert!(matches!(spec, CheckSpec::Process));
}

#[tokio::test]
async fn process_check_without_pid_is_unknown() {
    let result = prober().evaluate(&CheckSpec::Process, None).await;
    assert_eq!(result.status, HealthStatus::Unknown);
}

#[tokio::test]
async fn process_check_sees_self() {
    let result = prober().evaluate(&CheckSpec::Process, Some(std::process::id())).await;
    assert_eq!(result.status, HealthStatus::Healthy);
}

#[tokio::test]
async fn tcp_check_refused_port_is_unhealthy() {
    let spec = TcpSpec { host: "127.0.0.1".to_owned(), port: 1, timeout_secs: 1 };
    let result = prober().check_tcp(&spec).await;
    assert_eq!(result.status, HealthStatus::Unhealthy);
}

#[tokio::test]
async fn tcp_check_open_port_is_healthy() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let spec = TcpSpec { host: "127.0.0.1".to_owned(), port, timeout_secs: 1 };
    let result = prober().check_tcp(&spec).await;
    assert_eq!(result.status, HealthStatus::Healthy);
}

#[tokio::test]
async fn script_exit_codes_map_to_bands() {
    let script = ScriptSpec {
        path: "/bin/sh".to_owned(),
        args: vec!["-c".to_owned(), "exit 0".to_owned()],
        timeout_secs: 5,
    };
    assert_eq!(prober().check_script(&script).await.status, HealthStatus::Healthy);

    let script = ScriptSpec {
        path: "/bin/sh".to_owned(),
        args: vec!["-c".to_owned(), "exit 1".to_owned()],
        timeout_secs: 5,
    };
    assert_eq!(prober().check_script(&script).await.status, HealthStatus::Degraded);

    let script = ScriptSpec {
        path: "/bin/sh".to_owned(),
        args: vec!["-c".to_owned(), "exit 7".to_owned()],
        timeout_secs: 5,
    };
    assert_eq!(prober().check_script(&script).await.status, HealthStatus::Unhealthy);
}

#[tokio::test]
async fn missing_script_is_unknown() {
    let script = ScriptSpec {
        path: "/nonexistent/warden-check".to_owned(),
        args: vec![],
        timeout_secs: 5,
    };
    assert_eq!(prober().check_script(&script).await.status, HealthStatus::Unknown);
}

#[tokio::test]
async fn http_error_uses_tcp_fallback() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    // Unroutable endpoint, but the fallback TCP target accepts.
    let spec = HttpSpec {
        endpoint: "http://127.0.0.1:1/health".to_owned(),
        timeout_secs: 1,
        expected_status: 200,
        expected_content: None,
        fallback: Some(TcpSpec { host: "127.0.0.1".to_owned(), port, timeout_secs: 1 }),
    };
    let result = prober().check_http(&spec).await;
    assert_eq!(result.status, HealthStatus::Healthy);
}
