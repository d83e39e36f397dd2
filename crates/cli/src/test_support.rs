// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted fakes for exercising the assigner without a live multiplexer.

use std::collections::{HashMap, HashSet};

use futures_util::future::BoxFuture;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::terminal::{Key, PaneInfo, TerminalMux};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentInput {
    Text(String),
    Key(String),
}

/// In-memory multiplexer: panes with scripted captures, recorded input.
#[derive(Default)]
pub struct FakeMux {
    captures: Mutex<HashMap<String, String>>,
    sent: Mutex<Vec<(String, SentInput)>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pane(&self, name: &str, capture: &str) {
        self.captures.lock().insert(name.to_owned(), capture.to_owned());
    }

    pub fn set_capture(&self, name: &str, capture: &str) {
        self.captures.lock().insert(name.to_owned(), capture.to_owned());
    }

    pub fn append_output(&self, name: &str, output: &str) {
        let mut captures = self.captures.lock();
        if let Some(capture) = captures.get_mut(name) {
            capture.push_str(output);
        }
    }

    pub fn current_capture(&self, name: &str) -> Option<String> {
        self.captures.lock().get(name).cloned()
    }

    pub fn remove_pane(&self, name: &str) {
        self.captures.lock().remove(name);
    }

    /// Make every send to `name` fail with a transport error.
    pub fn fail_sends_to(&self, name: &str) {
        self.failing.lock().insert(name.to_owned());
    }

    pub fn sent_to(&self, name: &str) -> Vec<SentInput> {
        self.sent
            .lock()
            .iter()
            .filter(|(session, _)| session == name)
            .map(|(_, input)| input.clone())
            .collect()
    }
}

impl TerminalMux for FakeMux {
    fn send_text<'a>(&'a self, session: &'a str, text: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.failing.lock().contains(session) {
                return Err(Error::transport(format!("scripted failure for {session}")));
            }
            if !self.captures.lock().contains_key(session) {
                return Err(Error::not_found(format!("pane {session}")));
            }
            self.sent.lock().push((session.to_owned(), SentInput::Text(text.to_owned())));
            Ok(())
        })
    }

    fn send_key<'a>(&'a self, session: &'a str, key: Key) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.failing.lock().contains(session) {
                return Err(Error::transport(format!("scripted failure for {session}")));
            }
            if !self.captures.lock().contains_key(session) {
                return Err(Error::not_found(format!("pane {session}")));
            }
            self.sent.lock().push((session.to_owned(), SentInput::Key(key.name())));
            Ok(())
        })
    }

    fn capture<'a>(&'a self, session: &'a str, max_bytes: usize) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let captures = self.captures.lock();
            let capture = captures
                .get(session)
                .ok_or_else(|| Error::not_found(format!("pane {session}")))?;
            Ok(crate::terminal::tail_bytes(capture, max_bytes).to_owned())
        })
    }

    fn list<'a>(&'a self) -> BoxFuture<'a, Result<Vec<PaneInfo>>> {
        Box::pin(async move {
            let captures = self.captures.lock();
            let mut panes: Vec<PaneInfo> = captures
                .keys()
                .map(|name| PaneInfo { name: name.clone(), attached: true })
                .collect();
            panes.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(panes)
        })
    }
}
