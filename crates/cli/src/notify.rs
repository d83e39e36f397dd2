// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fire-and-forget notification fanout. Senders never block and never see
//! delivery errors; slow or absent consumers lose events, not the core.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::SharedClock;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub severity: Severity,
    pub source: String,
    pub subject: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
    clock: SharedClock,
}

impl Notifier {
    pub fn new(clock: SharedClock) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx, clock }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Emit an event. Always logs; broadcast delivery is best-effort.
    pub fn notify(
        &self,
        severity: Severity,
        source: &str,
        subject: Option<&str>,
        message: impl Into<String>,
    ) {
        let message = message.into();
        match severity {
            Severity::Info => info!(source, subject, "{message}"),
            Severity::Warning => warn!(source, subject, "{message}"),
            Severity::Critical => error!(source, subject, "{message}"),
        }

        let _ = self.tx.send(Notification {
            severity,
            source: source.to_owned(),
            subject: subject.map(str::to_owned),
            message,
            timestamp: self.clock.utc(),
        });
    }

    /// Forward notifications to a webhook until shutdown. Failures are
    /// logged and dropped; the forwarder never applies backpressure.
    pub fn spawn_webhook_forwarder(&self, url: String, shutdown: CancellationToken) {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            let client = reqwest::Client::new();
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = rx.recv() => {
                        let event = match event {
                            Ok(event) => event,
                            Err(broadcast::error::RecvError::Lagged(missed)) => {
                                debug!(missed, "webhook forwarder lagged");
                                continue;
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        };
                        if let Err(e) = client.post(&url).json(&event).send().await {
                            debug!("webhook delivery failed: {e}");
                        }
                    }
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
