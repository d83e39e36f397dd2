// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Candidate selection. Pure over an in-memory pool so one tick sees a
//! consistent view: a session claimed for one prompt is gone for the rest
//! of the tick.

use crate::store::{Prompt, SessionRecord};

/// Pick a session for `prompt` out of `pool` and remove it from the pool.
///
/// Order of constraints:
/// 1. A hard `target_session` is never relaxed: either that exact session
///    is in the pool or the prompt stays pending.
/// 2. Otherwise `target_provider`, then each fallback provider in order;
///    the first provider with any candidate wins.
/// 3. Within the surviving candidates, the longest-idle session wins;
///    name order breaks exact timestamp ties.
pub fn select_candidate(prompt: &Prompt, pool: &mut Vec<SessionRecord>) -> Option<SessionRecord> {
    if let Some(target) = prompt.target_session.as_deref() {
        let index = pool.iter().position(|s| s.name == target)?;
        return Some(pool.swap_remove(index));
    }

    if let Some(primary) = prompt.target_provider {
        let providers =
            std::iter::once(primary).chain(prompt.fallback_providers.iter().copied());
        for provider in providers {
            if let Some(index) = best_index(pool, |s| s.provider == provider) {
                return Some(pool.swap_remove(index));
            }
        }
        return None;
    }

    let index = best_index(pool, |_| true)?;
    Some(pool.swap_remove(index))
}

/// Index of the best candidate among those matching `pred`: oldest
/// `last_activity`, ties broken lexicographically by name for determinism.
fn best_index(pool: &[SessionRecord], pred: impl Fn(&SessionRecord) -> bool) -> Option<usize> {
    pool.iter()
        .enumerate()
        .filter(|(_, s)| pred(s))
        .min_by(|(_, a), (_, b)| {
            a.last_activity.cmp(&b.last_activity).then_with(|| a.name.cmp(&b.name))
        })
        .map(|(index, _)| index)
}

#[cfg(test)]
#[path = "matching_tests.rs"]
mod tests;
