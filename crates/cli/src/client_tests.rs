// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    not_found = { "not_found", 2 },
    config = { "config", 3 },
    invalid_state = { "invalid_state", 1 },
    transport = { "transport", 1 },
)]
fn api_error_kinds_map_to_exit_codes(kind: &str, expected: i32) {
    assert_eq!(exit_code_for(kind), expected);
}

#[test]
fn unreachable_daemon_exits_one() {
    // Reserved port on loopback: refused immediately.
    let code = run("http://127.0.0.1:1", &Command::Sessions);
    assert_eq!(code, 1);
}
