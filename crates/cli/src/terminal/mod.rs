// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal adapter: turns named multiplexer panes into a small capability
//! (send text, send a key, capture recent output, list panes). The
//! multiplexer itself is external; everything here shells out to `tmux`.

pub mod classify;

pub use classify::{Classifier, Marker, MarkerSet};

use std::collections::HashMap;
use std::fmt;
use std::process::Stdio;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::error::{Error, Result};

/// A key the adapter can deliver to a pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Escape,
    Digit(u8),
}

impl Key {
    /// tmux key name.
    pub fn name(&self) -> String {
        match self {
            Self::Enter => "Enter".to_owned(),
            Self::Escape => "Escape".to_owned(),
            Self::Digit(d) => d.to_string(),
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "enter" => Ok(Self::Enter),
            "escape" => Ok(Self::Escape),
            d if d.len() == 1 && d.as_bytes()[0].is_ascii_digit() => {
                Ok(Self::Digit(d.as_bytes()[0] - b'0'))
            }
            other => Err(Error::config(format!("unknown key: {other}"))),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// One known pane.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PaneInfo {
    pub name: String,
    pub attached: bool,
}

/// Capability over an external terminal multiplexer.
///
/// Implementations serialize calls per session: a single pane never sees
/// two in-flight operations, while distinct panes proceed independently.
pub trait TerminalMux: Send + Sync {
    fn send_text<'a>(&'a self, session: &'a str, text: &'a str) -> BoxFuture<'a, Result<()>>;
    fn send_key<'a>(&'a self, session: &'a str, key: Key) -> BoxFuture<'a, Result<()>>;
    fn capture<'a>(&'a self, session: &'a str, max_bytes: usize) -> BoxFuture<'a, Result<String>>;
    fn list<'a>(&'a self) -> BoxFuture<'a, Result<Vec<PaneInfo>>>;
}

pub type SharedMux = Arc<dyn TerminalMux>;

/// Production adapter over the `tmux` binary.
pub struct TmuxAdapter {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TmuxAdapter {
    pub fn new() -> Self {
        Self { locks: Mutex::new(HashMap::new()) }
    }

    async fn session_lock(&self, session: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(session.to_owned()).or_default())
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("tmux")
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::transport(format!("tmux spawn: {e}")))?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("can't find") || stderr.contains("no such") {
            Err(Error::not_found(format!("tmux: {}", stderr.trim())))
        } else {
            Err(Error::transport(format!("tmux: {}", stderr.trim())))
        }
    }
}

impl Default for TmuxAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalMux for TmuxAdapter {
    fn send_text<'a>(&'a self, session: &'a str, text: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let lock = self.session_lock(session).await;
            let _held = lock.lock().await;
            // -l delivers the text literally, without key-name expansion.
            self.run(&["send-keys", "-t", session, "-l", text]).await?;
            Ok(())
        })
    }

    fn send_key<'a>(&'a self, session: &'a str, key: Key) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let lock = self.session_lock(session).await;
            let _held = lock.lock().await;
            self.run(&["send-keys", "-t", session, &key.name()]).await?;
            Ok(())
        })
    }

    fn capture<'a>(&'a self, session: &'a str, max_bytes: usize) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let lock = self.session_lock(session).await;
            let _held = lock.lock().await;
            // Scrollback depth sized from the byte budget; panes are ~64
            // visible columns of useful text per line in practice.
            let lines = (max_bytes / 64).max(100);
            let scrollback = format!("-{lines}");
            let raw =
                self.run(&["capture-pane", "-t", session, "-p", "-J", "-S", &scrollback]).await?;
            let clean = strip_controls(&raw);
            Ok(tail_bytes(&clean, max_bytes).to_owned())
        })
    }

    fn list<'a>(&'a self) -> BoxFuture<'a, Result<Vec<PaneInfo>>> {
        Box::pin(async move {
            let raw = match self
                .run(&["list-sessions", "-F", "#{session_name} #{session_attached}"])
                .await
            {
                Ok(raw) => raw,
                // No server yet means no panes, not a failure.
                Err(e) if e.message.contains("no server running") => return Ok(vec![]),
                Err(e) => return Err(e),
            };

            let mut panes = Vec::new();
            for line in raw.lines() {
                let mut parts = line.rsplitn(2, ' ');
                let attached = parts.next().map(|a| a != "0").unwrap_or(false);
                if let Some(name) = parts.next() {
                    panes.push(PaneInfo { name: name.to_owned(), attached });
                }
            }
            Ok(panes)
        })
    }
}

/// Strip terminal control sequences (CSI, OSC, and bare escapes) from
/// captured output, keeping printable text and newlines.
pub fn strip_controls(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            0x1b => {
                i += 1;
                match bytes.get(i) {
                    // CSI: parameters then a final byte in 0x40..=0x7e.
                    Some(b'[') => {
                        i += 1;
                        while i < bytes.len() && !(0x40..=0x7e).contains(&bytes[i]) {
                            i += 1;
                        }
                        i += 1;
                    }
                    // OSC: terminated by BEL or ST.
                    Some(b']') => {
                        i += 1;
                        while i < bytes.len() {
                            if bytes[i] == 0x07 {
                                i += 1;
                                break;
                            }
                            if bytes[i] == 0x1b && bytes.get(i + 1) == Some(&b'\\') {
                                i += 2;
                                break;
                            }
                            i += 1;
                        }
                    }
                    Some(_) => i += 2,
                    None => {}
                }
            }
            b'\r' => i += 1,
            c if c < 0x20 && c != b'\n' && c != b'\t' => i += 1,
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Last `max_bytes` of `s`, snapped to a char boundary.
pub fn tail_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut start = s.len() - max_bytes;
    while start < s.len() && !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
