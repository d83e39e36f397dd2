// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idle/busy classification from captured pane output.
//!
//! Each provider registers marker tuples (idle, busy, waiting). A marker is
//! a plain substring (matched case-insensitively) or a compiled regex.
//! Busy markers win over waiting, waiting over idle; nothing matching is
//! `unknown`. All matching runs against the tail of the capture, where the
//! live prompt or spinner sits.

use std::collections::HashMap;

use regex::Regex;

use crate::config::{MarkerPattern, ProviderMarkers};
use crate::error::{Error, Result};
use crate::store::{Provider, SessionStatus};

use super::tail_bytes;

/// Bytes of capture tail considered by the classifier.
const TAIL_BYTES: usize = 2048;

#[derive(Debug, Clone)]
pub enum Marker {
    Plain(String),
    Pattern(Regex),
}

impl Marker {
    pub fn compile(pattern: &MarkerPattern) -> Result<Self> {
        match pattern {
            MarkerPattern::Plain(text) => Ok(Self::Plain(text.to_lowercase())),
            MarkerPattern::Spec { pattern, regex: false } => {
                Ok(Self::Plain(pattern.to_lowercase()))
            }
            MarkerPattern::Spec { pattern, regex: true } => {
                let compiled = Regex::new(pattern)
                    .map_err(|e| Error::config(format!("marker /{pattern}/: {e}")))?;
                Ok(Self::Pattern(compiled))
            }
        }
    }

    fn matches(&self, tail: &str, tail_lower: &str) -> bool {
        match self {
            Self::Plain(needle) => tail_lower.contains(needle.as_str()),
            Self::Pattern(re) => re.is_match(tail),
        }
    }
}

/// Compiled marker tuple for one provider.
#[derive(Debug, Clone, Default)]
pub struct MarkerSet {
    idle: Vec<Marker>,
    busy: Vec<Marker>,
    waiting: Vec<Marker>,
}

impl MarkerSet {
    pub fn compile(config: &ProviderMarkers) -> Result<Self> {
        Ok(Self {
            idle: config.idle.iter().map(Marker::compile).collect::<Result<_>>()?,
            busy: config.busy.iter().map(Marker::compile).collect::<Result<_>>()?,
            waiting: config.waiting.iter().map(Marker::compile).collect::<Result<_>>()?,
        })
    }

    fn classify(&self, capture: &str) -> SessionStatus {
        let tail = tail_bytes(capture, TAIL_BYTES);
        let tail_lower = tail.to_lowercase();

        if self.busy.iter().any(|m| m.matches(tail, &tail_lower)) {
            return SessionStatus::Busy;
        }
        if self.waiting.iter().any(|m| m.matches(tail, &tail_lower)) {
            return SessionStatus::WaitingInput;
        }
        if self.idle.iter().any(|m| m.matches(tail, &tail_lower)) {
            return SessionStatus::Idle;
        }
        SessionStatus::Unknown
    }
}

/// Provider-keyed classifier, rebuilt on config reload.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    sets: HashMap<Provider, MarkerSet>,
}

impl Classifier {
    pub fn from_config(providers: &HashMap<String, ProviderMarkers>) -> Result<Self> {
        let mut sets = HashMap::new();
        for (name, markers) in providers {
            let provider: Provider = name.parse()?;
            sets.insert(provider, MarkerSet::compile(markers)?);
        }
        Ok(Self { sets })
    }

    /// Classify a capture for the given provider. A provider with no
    /// registered markers always reads as `unknown`.
    pub fn classify(&self, provider: Provider, capture: &str) -> SessionStatus {
        match self.sets.get(&provider) {
            Some(set) => set.classify(capture),
            None => SessionStatus::Unknown,
        }
    }
}

#[cfg(test)]
#[path = "classify_tests.rs"]
mod tests;
