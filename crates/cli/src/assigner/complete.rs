// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Completion detection: sweep busy sessions, classify their captures,
//! scrape responses, and enforce per-prompt timeouts.

use tracing::{debug, info, warn};

use crate::notify::Severity;
use crate::store::{PromptStatus, SessionStatus};

use super::Assigner;

impl Assigner {
    /// One completion sweep over timed-out prompts and busy sessions.
    pub async fn completion_tick(&self) {
        self.expire_overdue_prompts().await;
        self.sweep_busy_sessions().await;
    }

    /// Per-prompt deadline enforcement: an in-flight prompt past its
    /// timeout fails with a timeout error and frees its session.
    async fn expire_overdue_prompts(&self) {
        let now = self.clock.utc();
        let expired = match self.store.expired_prompts(now).await {
            Ok(expired) => expired,
            Err(e) => {
                warn!("load expired prompts: {e}");
                return;
            }
        };

        let retry_on_timeout = self.shared().config.retry_on_timeout;
        for prompt in expired {
            let Some(session) = prompt.assigned_session.clone() else { continue };
            let message = format!("timeout: no completion within {}s", prompt.timeout_secs);
            if let Err(e) = self.store.fail_prompt(prompt.id, &session, &message, now).await {
                warn!(prompt = prompt.id, "expire failed: {e}");
                continue;
            }
            self.baselines.lock().await.remove(&prompt.id);
            self.notifier.notify(
                Severity::Warning,
                "assigner",
                Some(&session),
                format!("prompt {} timed out", prompt.id),
            );
            if retry_on_timeout {
                match self.store.retry_prompt(prompt.id, self.clock.utc()).await {
                    Ok(true) => info!(prompt = prompt.id, "timed-out prompt re-queued"),
                    Ok(false) => {}
                    Err(e) => warn!(prompt = prompt.id, "re-queue failed: {e}"),
                }
            }
        }
    }

    async fn sweep_busy_sessions(&self) {
        let sessions = match self.store.busy_sessions().await {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!("load busy sessions: {e}");
                return;
            }
        };

        for session in sessions {
            let Some(prompt_id) = session.current_task_id else { continue };
            let prompt = match self.store.get_prompt(prompt_id).await {
                Ok(prompt) => prompt,
                Err(e) => {
                    warn!(prompt = prompt_id, "load prompt: {e}");
                    continue;
                }
            };

            let shared = self.shared();
            let capture =
                match self.mux.capture(&session.name, shared.config.capture_bytes).await {
                    Ok(capture) => capture,
                    Err(e) => {
                        // The pane is gone or the multiplexer errored; the
                        // prompt cannot complete there.
                        warn!(session = %session.name, "capture failed: {e}");
                        let now = self.clock.utc();
                        if let Err(fail) = self
                            .store
                            .fail_prompt(prompt.id, &session.name, &e.to_string(), now)
                            .await
                        {
                            warn!(prompt = prompt.id, "fail after capture error: {fail}");
                        }
                        self.baselines.lock().await.remove(&prompt.id);
                        self.notifier.notify(
                            Severity::Warning,
                            "assigner",
                            Some(&session.name),
                            format!("prompt {} failed: {e}", prompt.id),
                        );
                        continue;
                    }
                };

            let status = shared.classifier.classify(session.provider, &capture);
            let tail = crate::terminal::tail_bytes(&capture, 512).to_owned();
            let now = self.clock.utc();

            match status {
                SessionStatus::Busy => {
                    // First observed busy marker is the worker's ack.
                    if prompt.status == PromptStatus::Assigned {
                        if let Err(e) = self.store.mark_in_progress(prompt.id).await {
                            warn!(prompt = prompt.id, "mark in progress: {e}");
                        } else {
                            debug!(prompt = prompt.id, "worker acknowledged");
                        }
                    }
                    let _ = self
                        .store
                        .observe_session(&session.name, SessionStatus::Busy, Some(&tail), now)
                        .await;
                }
                SessionStatus::Idle => {
                    let baseline =
                        self.baselines.lock().await.get(&prompt.id).cloned().unwrap_or_default();
                    let response = diff_response(&baseline, &capture);

                    // A fast worker can finish between sweeps, but an idle
                    // capture with no new output right after assignment is
                    // just the prompt echo lag; give it another sweep.
                    if prompt.status == PromptStatus::Assigned && response.is_empty() {
                        continue;
                    }

                    match self.store.complete_prompt(prompt.id, &session.name, &response, now).await
                    {
                        Ok(()) => {
                            info!(prompt = prompt.id, session = %session.name, "prompt completed");
                            self.baselines.lock().await.remove(&prompt.id);
                        }
                        Err(e) => warn!(prompt = prompt.id, "complete: {e}"),
                    }
                }
                SessionStatus::WaitingInput => {
                    let _ = self
                        .store
                        .observe_session(
                            &session.name,
                            SessionStatus::WaitingInput,
                            Some(&tail),
                            now,
                        )
                        .await;
                }
                SessionStatus::Unknown => {}
            }
        }
    }
}

/// Output written since injection: the capture minus its common prefix
/// with the baseline. When scrollback rotated and the baseline no longer
/// prefixes the capture, the whole capture tail is the best answer.
pub fn diff_response(baseline: &str, current: &str) -> String {
    let common = baseline
        .as_bytes()
        .iter()
        .zip(current.as_bytes())
        .take_while(|(a, b)| a == b)
        .count();
    let mut start = common;
    while !current.is_char_boundary(start) {
        start -= 1;
    }
    current[start..].trim().to_owned()
}

#[cfg(test)]
#[path = "complete_tests.rs"]
mod tests;
