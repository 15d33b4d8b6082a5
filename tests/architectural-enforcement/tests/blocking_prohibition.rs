//! Integration Test: Blocking Prohibition
//!
//! Stream workers share the tokio runtime with every other worker of a turn.
//! A single blocking call stalls them all, so the streaming core must only
//! wait on async I/O.
//!
//! Configuration loading reads its file with `std::fs` before any turn runs
//! and is allowed.

use architectural_enforcement::{report, scan, Forbidden, CLI_SOURCES, CORE_SOURCES};

const BLOCKING: &[Forbidden] = &[
    Forbidden {
        pattern: "std::thread::sleep",
        rule: "Blocking sleep",
    },
    Forbidden {
        pattern: "reqwest::blocking",
        rule: "Blocking HTTP client",
    },
    Forbidden {
        pattern: "block_on(",
        rule: "Nested runtime",
    },
    Forbidden {
        pattern: "std::net::",
        rule: "Blocking network I/O",
    },
    Forbidden {
        pattern: "std::io::stdin()",
        rule: "Blocking stdin",
    },
];

/// The core never sleeps or blocks
#[test]
fn test_no_blocking_calls_in_core() {
    let violations = scan(CORE_SOURCES, BLOCKING);
    report("Blocking calls found in the streaming core", &violations);
}

/// The core waits on events, not on timers
#[test]
fn test_no_sleep_in_core() {
    let violations = scan(
        CORE_SOURCES,
        &[Forbidden {
            pattern: "time::sleep",
            rule: "Sleep instead of waiting on I/O",
        }],
    );
    report("Sleep calls found in the streaming core", &violations);
}

/// The client reads input asynchronously so Ctrl-C can cancel a turn
#[test]
fn test_no_blocking_input_in_cli() {
    let violations = scan(
        CLI_SOURCES,
        &[
            Forbidden {
                pattern: "std::io::stdin()",
                rule: "Blocking stdin",
            },
            Forbidden {
                pattern: "std::thread::sleep",
                rule: "Blocking sleep",
            },
        ],
    );
    report("Blocking input found in the terminal client", &violations);
}
