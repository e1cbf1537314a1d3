//! Fuzz target for numeric range expansion.

#![no_main]

use hwm_core::generate::generate_range;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // Expansion is lazy; walk a bounded prefix.
    let _ = generate_range(text).take(4096).count();
});
