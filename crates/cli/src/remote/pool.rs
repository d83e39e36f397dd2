// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-socket registry: at most one multiplexed SSH channel per
//! (host, user, port, key) quadruple, closed after an idle timeout.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

use crate::clock::SharedClock;

use super::RemoteTarget;

struct Channel {
    control_path: PathBuf,
    last_used: Instant,
}

pub struct ChannelPool {
    channels: Mutex<HashMap<RemoteTarget, Channel>>,
    socket_dir: PathBuf,
    idle_timeout: Duration,
    clock: SharedClock,
}

impl ChannelPool {
    pub fn new(idle_timeout: Duration, clock: SharedClock) -> Self {
        let socket_dir = std::env::temp_dir().join(format!("warden-ssh-{}", std::process::id()));
        Self { channels: Mutex::new(HashMap::new()), socket_dir, idle_timeout, clock }
    }

    /// Control socket path for a target, creating the entry on first use.
    /// The master itself is established lazily by the first ssh invocation
    /// (`ControlMaster=auto`).
    pub async fn checkout(&self, target: &RemoteTarget) -> PathBuf {
        let mut channels = self.channels.lock().await;
        let now = self.clock.now();
        if let Some(channel) = channels.get_mut(target) {
            channel.last_used = now;
            return channel.control_path.clone();
        }

        let _ = std::fs::create_dir_all(&self.socket_dir);
        let name = format!(
            "{}-{}-{}",
            target.user.as_deref().unwrap_or("default"),
            target.host,
            target.port
        );
        let control_path = self.socket_dir.join(name);
        channels.insert(
            target.clone(),
            Channel { control_path: control_path.clone(), last_used: now },
        );
        control_path
    }

    /// Close channels that have been unused past the idle timeout.
    pub async fn reap_idle(&self) {
        let mut channels = self.channels.lock().await;
        let now = self.clock.now();
        let mut stale = Vec::new();
        channels.retain(|target, channel| {
            if now.saturating_duration_since(channel.last_used) >= self.idle_timeout {
                stale.push((target.clone(), channel.control_path.clone()));
                false
            } else {
                true
            }
        });
        drop(channels);

        for (target, control_path) in stale {
            debug!(host = %target.host, "closing idle ssh channel");
            close_master(&target, &control_path).await;
        }
    }

    pub async fn close_all(&self) {
        let mut channels = self.channels.lock().await;
        let all: Vec<(RemoteTarget, PathBuf)> = channels
            .drain()
            .map(|(target, channel)| (target, channel.control_path))
            .collect();
        drop(channels);

        for (target, control_path) in all {
            close_master(&target, &control_path).await;
        }
    }

    pub async fn open_count(&self) -> usize {
        self.channels.lock().await.len()
    }
}

async fn close_master(target: &RemoteTarget, control_path: &std::path::Path) {
    let _ = Command::new("ssh")
        .arg("-O")
        .arg("exit")
        .arg("-o")
        .arg(format!("ControlPath={}", control_path.display()))
        .arg(target.destination())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    let _ = std::fs::remove_file(control_path);
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
