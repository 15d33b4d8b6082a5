//! Integration Test: Panic Prohibition
//!
//! A panicking worker loses its partial answer and a panicking orchestrator
//! loses the whole conversation. Production code in the core propagates
//! errors instead.

use architectural_enforcement::{report, scan, Forbidden, CORE_SOURCES};

const PANICKING: &[Forbidden] = &[
    Forbidden {
        pattern: ".unwrap()",
        rule: "unwrap",
    },
    Forbidden {
        pattern: ".expect(",
        rule: "expect",
    },
    Forbidden {
        pattern: "panic!(",
        rule: "explicit panic",
    },
    Forbidden {
        pattern: "todo!(",
        rule: "unfinished code",
    },
    Forbidden {
        pattern: "unimplemented!(",
        rule: "unfinished code",
    },
];

#[test]
fn test_no_panics_in_core() {
    let violations = scan(CORE_SOURCES, PANICKING);
    report("Panicking calls found in the streaming core", &violations);
}
