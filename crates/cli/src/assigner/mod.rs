// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The assigner: a priority-ordered prompt queue matched onto idle
//! terminal sessions, with injection, completion detection, and
//! retry/reassign bookkeeping. The store is the system of record; ticks
//! re-read it rather than trusting anything cached.

pub mod complete;
pub mod matching;

pub use matching::select_candidate;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::cluster::Coordinator;
use crate::config::AssignerConfig;
use crate::error::Result;
use crate::notify::{Notifier, Severity};
use crate::store::{NewPrompt, Prompt, Provider, SessionStatus, Store};
use crate::terminal::{Classifier, Key, SharedMux};

struct Shared {
    config: AssignerConfig,
    classifier: Classifier,
    excluded: HashSet<String>,
}

impl Shared {
    fn build(config: AssignerConfig) -> Result<Self> {
        let classifier = Classifier::from_config(&config.providers)?;
        let excluded = config.excluded_sessions.iter().cloned().collect();
        Ok(Self { config, classifier, excluded })
    }
}

pub struct Assigner {
    store: Store,
    mux: SharedMux,
    notifier: Notifier,
    clock: SharedClock,
    shared: RwLock<Arc<Shared>>,
    /// Capture taken right after injection, keyed by prompt id; the
    /// completion sweep diffs against it to scrape the response.
    baselines: Mutex<HashMap<i64, String>>,
    coordinator: Option<Arc<Coordinator>>,
}

impl Assigner {
    pub fn new(
        store: Store,
        mux: SharedMux,
        notifier: Notifier,
        clock: SharedClock,
        config: AssignerConfig,
    ) -> Result<Self> {
        Ok(Self {
            store,
            mux,
            notifier,
            clock,
            shared: RwLock::new(Arc::new(Shared::build(config)?)),
            baselines: Mutex::new(HashMap::new()),
            coordinator: None,
        })
    }

    /// Wire in the cluster coordinator for placement hints.
    pub fn with_coordinator(mut self, coordinator: Arc<Coordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    fn shared(&self) -> Arc<Shared> {
        Arc::clone(&self.shared.read())
    }

    /// Swap in reloaded markers, exclusions, and defaults.
    pub fn reload(&self, config: AssignerConfig) -> Result<()> {
        let shared = Arc::new(Shared::build(config)?);
        *self.shared.write() = shared;
        info!("assigner configuration reloaded");
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.shared().config.tick_interval_secs)
    }

    pub fn completion_interval(&self) -> Duration {
        Duration::from_secs(self.shared().config.completion_interval_secs)
    }

    // -- Operator surface -----------------------------------------------------

    pub async fn submit_prompt(&self, new: &NewPrompt) -> Result<Prompt> {
        let shared = self.shared();
        let prompt = self
            .store
            .create_prompt(
                new,
                i64::from(shared.config.default_max_retries),
                shared.config.default_timeout_secs as i64,
                self.clock.utc(),
            )
            .await?;
        info!(prompt = prompt.id, priority = prompt.priority, "prompt queued");
        Ok(prompt)
    }

    pub async fn retry_prompt(&self, id: i64) -> Result<bool> {
        self.store.retry_prompt(id, self.clock.utc()).await
    }

    pub async fn retry_all_failed(&self) -> Result<u64> {
        self.store.retry_all_failed(self.clock.utc()).await
    }

    pub async fn reassign_prompt(&self, id: i64, new_target: &str) -> Result<()> {
        self.baselines.lock().await.remove(&id);
        self.store.reassign_prompt(id, new_target, self.clock.utc()).await
    }

    pub async fn cancel_prompt(&self, id: i64) -> Result<()> {
        self.baselines.lock().await.remove(&id);
        self.store.cancel_prompt(id, self.clock.utc()).await
    }

    pub async fn clear_prompts(&self, days: i64) -> Result<u64> {
        self.store.clear_prompts(days, self.clock.utc()).await
    }

    // -- Session registry -----------------------------------------------------

    /// Sync the session table with the panes the multiplexer knows about.
    pub async fn discover_sessions(&self) {
        let panes = match self.mux.list().await {
            Ok(panes) => panes,
            Err(e) => {
                debug!("session discovery failed: {e}");
                return;
            }
        };

        let shared = self.shared();
        let now = self.clock.utc();
        let known: HashSet<String> = match self.store.list_sessions().await {
            Ok(sessions) => sessions.into_iter().map(|s| s.name).collect(),
            Err(e) => {
                warn!("list sessions: {e}");
                return;
            }
        };

        for pane in panes {
            if known.contains(&pane.name) {
                continue;
            }
            let provider = infer_provider(&pane.name);
            if let Err(e) = self.store.upsert_session(&pane.name, provider, None, now).await {
                warn!(session = %pane.name, "register session: {e}");
                continue;
            }
            if shared.excluded.contains(&pane.name) {
                let _ = self.store.set_session_excluded(&pane.name, true, now).await;
            }
            info!(session = %pane.name, provider = %provider, "session discovered");
        }
    }

    /// Classify every task-less, non-excluded session from a fresh capture.
    pub async fn refresh_sessions(&self) {
        let sessions = match self.store.list_sessions().await {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!("list sessions: {e}");
                return;
            }
        };
        let shared = self.shared();

        for session in sessions {
            if session.excluded
                || shared.excluded.contains(&session.name)
                || session.current_task_id.is_some()
            {
                continue;
            }
            let capture =
                match self.mux.capture(&session.name, shared.config.capture_bytes).await {
                    Ok(capture) => capture,
                    Err(e) => {
                        debug!(session = %session.name, "capture failed: {e}");
                        let _ = self
                            .store
                            .observe_session(
                                &session.name,
                                SessionStatus::Unknown,
                                None,
                                self.clock.utc(),
                            )
                            .await;
                        continue;
                    }
                };

            let status = shared.classifier.classify(session.provider, &capture);
            let tail = crate::terminal::tail_bytes(&capture, 512);
            if let Err(e) = self
                .store
                .observe_session(&session.name, status, Some(tail), self.clock.utc())
                .await
            {
                warn!(session = %session.name, "observe session: {e}");
            }
        }
    }

    // -- Matching tick --------------------------------------------------------

    /// One matching pass: sync the registry, then walk pending prompts in
    /// (priority desc, created asc) order over a consistent candidate pool.
    /// A blocked high-priority prompt does not starve placeable lower ones.
    pub async fn matching_tick(&self) {
        self.discover_sessions().await;
        self.refresh_sessions().await;

        let shared = self.shared();
        let pending = match self.store.pending_prompts(shared.config.match_batch_size as i64).await
        {
            Ok(pending) => pending,
            Err(e) => {
                warn!("load pending prompts: {e}");
                return;
            }
        };
        if pending.is_empty() {
            return;
        }

        let mut pool = match self.store.idle_sessions().await {
            Ok(pool) => pool,
            Err(e) => {
                warn!("load idle sessions: {e}");
                return;
            }
        };
        pool.retain(|s| !shared.excluded.contains(&s.name));

        for prompt in pending {
            if pool.is_empty() {
                break;
            }
            match select_candidate(&prompt, &mut pool) {
                // A session that fails injection is freed in the store but
                // stays out of this tick's pool.
                Some(session) => {
                    self.inject(&prompt, &session.name).await;
                }
                None => {
                    self.log_placement_hint(&prompt);
                }
            }
        }
    }

    /// Injection protocol: atomically bind, then deliver text + enter.
    /// A transport failure reverts the binding and surfaces as a failed
    /// prompt with a bumped retry counter.
    pub(crate) async fn inject(&self, prompt: &Prompt, session: &str) -> bool {
        let now = self.clock.utc();
        if let Err(e) = self.store.assign_prompt(prompt.id, session, now).await {
            debug!(prompt = prompt.id, session, "assign lost race: {e}");
            return false;
        }

        let delivery = async {
            self.mux.send_text(session, &prompt.content).await?;
            self.mux.send_key(session, Key::Enter).await
        };

        if let Err(e) = delivery.await {
            warn!(prompt = prompt.id, session, "injection failed: {e}");
            if let Err(revert) = self
                .store
                .revert_assignment(prompt.id, session, &e.to_string(), self.clock.utc())
                .await
            {
                warn!(prompt = prompt.id, "revert failed: {revert}");
            }
            self.notifier.notify(
                Severity::Warning,
                "assigner",
                Some(session),
                format!("prompt {} injection failed: {e}", prompt.id),
            );
            return false;
        }

        // Baseline for response scraping. A failed capture just degrades
        // the diff to the full tail.
        let shared = self.shared();
        let baseline = self
            .mux
            .capture(session, shared.config.capture_bytes)
            .await
            .unwrap_or_default();
        self.baselines.lock().await.insert(prompt.id, baseline);

        info!(prompt = prompt.id, session, "prompt assigned");
        true
    }

    fn log_placement_hint(&self, prompt: &Prompt) {
        let Some(provider) = prompt.target_provider else { return };
        let Some(coordinator) = &self.coordinator else { return };
        if let Some(node) = coordinator.placement_for(provider.as_str()) {
            debug!(
                prompt = prompt.id,
                provider = %provider,
                node = %node.node_id,
                "no local candidate; capable remote node available"
            );
        }
    }
}

/// Provider tag inferred from a pane name; sessions are conventionally
/// named after the worker they front (`claude_dev`, `codex-1`).
pub fn infer_provider(name: &str) -> Provider {
    let lower = name.to_lowercase();
    for provider in [Provider::Codex, Provider::Ollama, Provider::Comet] {
        if lower.contains(provider.as_str()) {
            return provider;
        }
    }
    Provider::Claude
}

/// Drive matching ticks until shutdown.
pub async fn run_matching(assigner: Arc<Assigner>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(assigner.tick_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }
        assigner.matching_tick().await;
    }
}

/// Drive completion sweeps until shutdown.
pub async fn run_completion(assigner: Arc<Assigner>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(assigner.completion_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }
        assigner.completion_tick().await;
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
