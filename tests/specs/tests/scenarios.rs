// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scheduling scenarios driven through the library with a
//! scripted multiplexer and a hand-driven clock.

use std::sync::Arc;
use std::time::Duration;

use warden::assigner::Assigner;
use warden::clock::{Clock, ManualClock, SharedClock};
use warden::config::{
    AssignerConfig, ClusterConfig, MarkerPattern, PeerConfig, ProviderMarkers, ServiceConfig,
    SupervisorConfig,
};
use warden::health::Prober;
use warden::notify::Notifier;
use warden::store::{NewPrompt, PromptStatus, Provider, SessionStatus, Store};
use warden::supervisor::{ServiceState, Supervisor};
use warden::test_support::FakeMux;

const IDLE: &str = "? for shortcuts";
const BUSY: &str = "esc to interrupt";

struct World {
    assigner: Assigner,
    mux: Arc<FakeMux>,
    clock: Arc<ManualClock>,
    store: Store,
    _dir: tempfile::TempDir,
}

async fn world() -> World {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&dir.path().join("warden.db")).await.unwrap();
    let clock = Arc::new(ManualClock::new());
    let shared: SharedClock = clock.clone();
    let mux = Arc::new(FakeMux::new());

    let mut config = AssignerConfig::default();
    for provider in ["claude", "codex", "ollama", "comet"] {
        config.providers.insert(
            provider.to_owned(),
            ProviderMarkers {
                idle: vec![MarkerPattern::Plain(IDLE.to_owned())],
                busy: vec![MarkerPattern::Plain(BUSY.to_owned())],
                waiting: vec![],
            },
        );
    }

    let assigner = Assigner::new(
        store.clone(),
        mux.clone(),
        Notifier::new(shared.clone()),
        shared,
        config,
    )
    .unwrap();

    World { assigner, mux, clock, store, _dir: dir }
}

impl World {
    async fn idle_session(&self, name: &str, idle_age_secs: i64) {
        self.mux.add_pane(name, IDLE);
        let at = self.clock.utc() - chrono::TimeDelta::seconds(idle_age_secs);
        self.store
            .upsert_session(name, warden::assigner::infer_provider(name), None, at)
            .await
            .unwrap();
        self.store.observe_session(name, SessionStatus::Idle, None, at).await.unwrap();
    }

    async fn submit(&self, content: &str, priority: i64) -> i64 {
        self.assigner
            .submit_prompt(&NewPrompt {
                content: content.to_owned(),
                source: "test".to_owned(),
                priority,
                target_session: None,
                target_provider: None,
                fallback_providers: vec![],
                max_retries: None,
                timeout_secs: None,
                metadata: None,
            })
            .await
            .unwrap()
            .id
    }

    async fn status_of(&self, id: i64) -> PromptStatus {
        self.store.get_prompt(id).await.unwrap().status
    }

    async fn session_of(&self, id: i64) -> Option<String> {
        self.store.get_prompt(id).await.unwrap().assigned_session
    }

    /// Script a completed worker turn on `session` and sweep it up: the
    /// spinner screen first (ack), then the redrawn screen with the
    /// response and the prompt line back.
    async fn finish(&self, session: &str, response: &str) {
        self.mux.set_capture(session, &format!("{IDLE}\n{BUSY}\n"));
        self.assigner.completion_tick().await;
        self.mux.set_capture(session, &format!("{IDLE}\n{response}\n{IDLE}\n"));
        self.assigner.completion_tick().await;
    }
}

// -- Seed scenario 1: priority ordering ---------------------------------------

#[tokio::test]
async fn priority_ordering_then_backfill() {
    let w = world().await;
    w.idle_session("s1", 100).await;
    w.idle_session("s2", 50).await;

    let a = w.submit("A", 1).await;
    let b = w.submit("B", 10).await;
    let c = w.submit("C", 5).await;

    w.assigner.matching_tick().await;

    assert_eq!(w.session_of(b).await.as_deref(), Some("s1"));
    assert_eq!(w.session_of(c).await.as_deref(), Some("s2"));
    assert_eq!(w.status_of(a).await, PromptStatus::Pending);

    // s1 finishes B with its response; A takes the freed session.
    w.finish("s1", "okB").await;
    let b = w.store.get_prompt(b).await.unwrap();
    assert_eq!(b.status, PromptStatus::Completed);
    assert!(b.response.as_deref().unwrap().contains("okB"));

    w.assigner.matching_tick().await;
    assert_eq!(w.session_of(a).await.as_deref(), Some("s1"));
}

// -- Seed scenario 2: hard target waits ---------------------------------------

#[tokio::test]
async fn hard_target_waits_for_busy_session() {
    let w = world().await;
    w.idle_session("qa", 10).await;
    w.mux.add_pane("dev", BUSY);
    w.store
        .upsert_session("dev", Provider::Claude, None, w.clock.utc())
        .await
        .unwrap();

    let p = w
        .assigner
        .submit_prompt(&NewPrompt {
            content: "P".to_owned(),
            source: "test".to_owned(),
            priority: 0,
            target_session: Some("dev".to_owned()),
            target_provider: None,
            fallback_providers: vec![],
            max_retries: None,
            timeout_secs: None,
            metadata: None,
        })
        .await
        .unwrap()
        .id;

    w.assigner.matching_tick().await;
    assert_eq!(w.status_of(p).await, PromptStatus::Pending);
    assert_eq!(w.session_of(p).await, None);

    w.mux.set_capture("dev", IDLE);
    w.assigner.matching_tick().await;
    assert_eq!(w.session_of(p).await.as_deref(), Some("dev"));
}

// -- Seed scenario 3: provider fallback ---------------------------------------

#[tokio::test]
async fn provider_fallback_lands_on_first_available() {
    let w = world().await;
    w.idle_session("c1", 10).await; // claude
    w.idle_session("o1-ollama", 10).await; // ollama

    let p = w
        .assigner
        .submit_prompt(&NewPrompt {
            content: "task".to_owned(),
            source: "test".to_owned(),
            priority: 0,
            target_session: None,
            target_provider: Some(Provider::Codex),
            fallback_providers: vec![Provider::Ollama, Provider::Claude],
            max_retries: None,
            timeout_secs: None,
            metadata: None,
        })
        .await
        .unwrap()
        .id;

    w.assigner.matching_tick().await;
    assert_eq!(w.session_of(p).await.as_deref(), Some("o1-ollama"));
}

// -- Seed scenario 4: retry bounded -------------------------------------------

#[tokio::test]
async fn retries_are_bounded_by_max_retries() {
    let w = world().await;
    w.idle_session("s1", 10).await;

    let p = w
        .assigner
        .submit_prompt(&NewPrompt {
            content: "doomed".to_owned(),
            source: "test".to_owned(),
            priority: 0,
            target_session: None,
            target_provider: None,
            fallback_providers: vec![],
            max_retries: Some(2),
            timeout_secs: Some(60),
            metadata: None,
        })
        .await
        .unwrap()
        .id;

    // Fail it three times: each round assigns, hangs busy, and times out.
    for round in 0..3 {
        w.mux.set_capture("s1", IDLE);
        w.assigner.matching_tick().await;
        assert_eq!(w.status_of(p).await, PromptStatus::Assigned, "round {round}");

        w.mux.set_capture("s1", BUSY);
        w.clock.advance(Duration::from_secs(61));
        w.assigner.completion_tick().await;
        assert_eq!(w.status_of(p).await, PromptStatus::Failed, "round {round}");

        let retried = w.assigner.retry_prompt(p).await.unwrap();
        assert_eq!(retried, round < 2, "round {round}");
    }

    let prompt = w.store.get_prompt(p).await.unwrap();
    assert_eq!(prompt.status, PromptStatus::Failed);
    assert_eq!(prompt.retry_count, 2);
    assert!(!w.assigner.retry_prompt(p).await.unwrap());
    assert_eq!(w.assigner.retry_all_failed().await.unwrap(), 0);
    assert_eq!(w.store.get_prompt(p).await.unwrap().retry_count, 2);
}

// -- Seed scenario 5: supervisor backoff --------------------------------------

#[tokio::test]
async fn supervisor_backoff_schedule_then_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&dir.path().join("warden.db")).await.unwrap();
    let clock = Arc::new(ManualClock::new());
    let shared: SharedClock = clock.clone();

    let service: ServiceConfig = toml::from_str(
        r#"
        id = "flappy"
        command = "/bin/sh"
        args = ["-c", "exit 1"]

        [restart_policy]
        max_retries = 5
        retry_delay_secs = 1
        backoff_multiplier = 2.0
        max_backoff_secs = 10
        "#,
    )
    .unwrap();

    let supervisor = Supervisor::new(
        store,
        Prober::new(shared.clone()),
        Notifier::new(shared.clone()),
        shared,
        SupervisorConfig {
            log_directory: dir.path().join("logs"),
            pid_directory: dir.path().join("pids"),
            ..SupervisorConfig::default()
        },
        vec![service],
    )
    .with_start_grace(Duration::from_millis(50));

    supervisor.start_all().await;

    // Observed delays: 1, 2, 4, 8, 10 (clamped), then fatal.
    let mut observed = Vec::new();
    loop {
        let status = supervisor.status().await.remove(0);
        match status.state {
            ServiceState::Backoff => {
                let delay = status.next_restart_in_secs.unwrap();
                observed.push(delay);
                clock.advance(Duration::from_secs(delay));
                supervisor.supervision_cycle().await;
            }
            ServiceState::Fatal => break,
            other => panic!("unexpected state {other}"),
        }
    }
    assert_eq!(observed, vec![1, 2, 4, 8, 10]);

    // No further restarts are attempted.
    clock.advance(Duration::from_secs(120));
    supervisor.supervision_cycle().await;
    assert_eq!(supervisor.status().await[0].state, ServiceState::Fatal);
}

// -- Seed scenario 6: failover ------------------------------------------------

#[tokio::test]
async fn failover_node_promotes_after_primary_loss() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&dir.path().join("warden.db")).await.unwrap();
    let clock = Arc::new(ManualClock::new());
    let shared: SharedClock = clock.clone();

    let coordinator = warden::cluster::Coordinator::new(
        ClusterConfig {
            node_id: "standby".to_owned(),
            role: "failover".to_owned(),
            host: "127.0.0.1".to_owned(),
            port: 5052,
            peers: vec![PeerConfig {
                node_id: "boss".to_owned(),
                role: "primary".to_owned(),
                host: "127.0.0.1".to_owned(),
                port: 1,
                services: vec![],
            }],
            ..ClusterConfig::default()
        },
        vec![],
        store.clone(),
        Notifier::new(shared.clone()),
        shared.clone(),
    )
    .await
    .unwrap();
    let prober = Prober::new(shared);

    // Primary heartbeats at t=0, then goes silent.
    coordinator
        .receive_heartbeat(&warden::cluster::HeartbeatPayload {
            node_id: "boss".to_owned(),
            role: warden::cluster::NodeRole::Primary,
            timestamp: clock.utc(),
            cpu_usage: 5.0,
            memory_usage: 10.0,
            disk_usage: 15.0,
        })
        .await
        .unwrap();

    // t=15: probe declares it unreachable, but the threshold has not passed.
    clock.advance(Duration::from_secs(15));
    coordinator.health_check_tick(&prober).await;
    assert_eq!(coordinator.role(), warden::cluster::NodeRole::Failover);

    // t>=30: promotion.
    clock.advance(Duration::from_secs(16));
    coordinator.health_check_tick(&prober).await;
    assert_eq!(coordinator.role(), warden::cluster::NodeRole::Primary);

    let log = store.failover_log(10).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].from_node.as_deref(), Some("boss"));
    assert_eq!(log[0].to_node, "standby");

    // Worker heartbeats now land at the new primary's registry.
    coordinator
        .receive_heartbeat(&warden::cluster::HeartbeatPayload {
            node_id: "boss".to_owned(),
            role: warden::cluster::NodeRole::Worker,
            timestamp: clock.utc(),
            cpu_usage: 1.0,
            memory_usage: 1.0,
            disk_usage: 1.0,
        })
        .await
        .unwrap();
}

// -- Invariants ---------------------------------------------------------------

#[tokio::test]
async fn one_in_flight_prompt_per_session() {
    let w = world().await;
    w.idle_session("s1", 10).await;

    let first = w.submit("first", 5).await;
    let second = w.submit("second", 1).await;
    w.assigner.matching_tick().await;

    // Only one prompt can hold the session.
    assert_eq!(w.session_of(first).await.as_deref(), Some("s1"));
    assert_eq!(w.status_of(second).await, PromptStatus::Pending);

    let session = w.store.get_session("s1").await.unwrap();
    assert_eq!(session.current_task_id, Some(first));

    let in_flight: Vec<_> = w
        .store
        .list_prompts(None, 100)
        .await
        .unwrap()
        .into_iter()
        .filter(|p| {
            p.assigned_session.as_deref() == Some("s1")
                && matches!(p.status, PromptStatus::Assigned | PromptStatus::InProgress)
        })
        .collect();
    assert_eq!(in_flight.len(), 1);
}

#[tokio::test]
async fn history_only_grows() {
    let w = world().await;
    w.idle_session("s1", 10).await;

    let p = w.submit("task", 0).await;
    let mut last = w.store.history_count().await.unwrap();

    w.assigner.matching_tick().await;
    let after_assign = w.store.history_count().await.unwrap();
    assert!(after_assign > last);
    last = after_assign;

    w.finish("s1", "done").await;
    let after_complete = w.store.history_count().await.unwrap();
    assert!(after_complete > last);

    let history = w.store.history_for_prompt(p).await.unwrap();
    let ids: Vec<i64> = history.iter().map(|h| h.id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);
}
