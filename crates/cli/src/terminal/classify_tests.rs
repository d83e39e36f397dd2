// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn markers(idle: &[&str], busy: &[&str], waiting: &[&str]) -> ProviderMarkers {
    ProviderMarkers {
        idle: idle.iter().map(|s| MarkerPattern::Plain((*s).to_owned())).collect(),
        busy: busy.iter().map(|s| MarkerPattern::Plain((*s).to_owned())).collect(),
        waiting: waiting.iter().map(|s| MarkerPattern::Plain((*s).to_owned())).collect(),
    }
}

fn classifier_for(provider: &str, set: ProviderMarkers) -> Classifier {
    let mut map = HashMap::new();
    map.insert(provider.to_owned(), set);
    Classifier::from_config(&map).unwrap()
}

#[test]
fn busy_marker_wins_over_idle() {
    let c = classifier_for("claude", markers(&["? for shortcuts"], &["thinking"], &[]));
    let capture = "some output\nThinking hard...\n? for shortcuts\n";
    assert_eq!(c.classify(Provider::Claude, capture), SessionStatus::Busy);
}

#[test]
fn idle_marker_matches_case_insensitively() {
    let c = classifier_for("claude", markers(&["? for shortcuts"], &["thinking"], &[]));
    assert_eq!(
        c.classify(Provider::Claude, "done.\n? FOR SHORTCUTS\n"),
        SessionStatus::Idle
    );
}

#[test]
fn waiting_marker_between_busy_and_idle() {
    let c = classifier_for(
        "codex",
        markers(&["ready"], &["working"], &["approve this action?"]),
    );
    assert_eq!(
        c.classify(Provider::Codex, "ready\napprove this action? [y/n]\n"),
        SessionStatus::WaitingInput
    );
}

#[test]
fn no_match_is_unknown() {
    let c = classifier_for("ollama", markers(&[">>>"], &[], &[]));
    assert_eq!(c.classify(Provider::Ollama, "loading model weights"), SessionStatus::Unknown);
    // Provider without registered markers.
    assert_eq!(c.classify(Provider::Comet, ">>> "), SessionStatus::Unknown);
}

#[test]
fn regex_markers_are_supported() {
    let set = ProviderMarkers {
        idle: vec![MarkerPattern::Spec { pattern: r"(?m)^❯\s*$".to_owned(), regex: true }],
        busy: vec![MarkerPattern::Spec { pattern: r"esc to interrupt".to_owned(), regex: false }],
        waiting: vec![],
    };
    let c = classifier_for("claude", set);
    assert_eq!(c.classify(Provider::Claude, "output\n❯\n"), SessionStatus::Idle);
    assert_eq!(
        c.classify(Provider::Claude, "output\nEsc to Interrupt\n❯\n"),
        SessionStatus::Busy
    );
}

#[test]
fn bad_regex_is_a_config_error() {
    let set = ProviderMarkers {
        idle: vec![MarkerPattern::Spec { pattern: "([".to_owned(), regex: true }],
        busy: vec![],
        waiting: vec![],
    };
    let mut map = HashMap::new();
    map.insert("claude".to_owned(), set);
    let err = Classifier::from_config(&map).unwrap_err();
    assert_eq!(err.kind(), crate::error::ErrorKind::Config);
}

#[test]
fn matching_only_sees_the_tail() {
    let c = classifier_for("claude", markers(&[], &["spinning"], &[]));
    // Busy marker scrolled far out of the tail window.
    let mut capture = String::from("spinning\n");
    capture.push_str(&"x".repeat(TAIL_BYTES * 2));
    assert_eq!(c.classify(Provider::Claude, &capture), SessionStatus::Unknown);
}
