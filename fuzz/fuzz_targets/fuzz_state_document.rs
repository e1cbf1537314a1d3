//! Fuzz target for state file parsing.
//!
//! Parsed entries must survive a render/parse cycle unchanged.

#![no_main]

use hwm_common::document::{parse_state, render_state};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(entries) = parse_state(text) {
        let rendered = render_state(&entries).expect("entries always render");
        let again = parse_state(&rendered).expect("rendered state parses");
        assert_eq!(entries, again);
    }
});
