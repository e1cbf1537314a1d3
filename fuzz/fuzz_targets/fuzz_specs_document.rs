//! Fuzz target for `.specs` parsing and matching.
//!
//! Any parsed spec list is matched against a fixed inventory; predicate
//! errors are fine, panics are not.

#![no_main]

use hwm_common::document::parse_specs;
use hwm_common::Fact;
use hwm_core::matcher::{match_all, Bindings};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(specs) = parse_specs(text) else {
        return;
    };
    let inventory = vec![
        Fact::new("disk", "sda", "size", "100"),
        Fact::new("disk", "sdb", "size", "8"),
        Fact::new("network", "eth0", "ipv4", "10.0.0.5"),
        Fact::new("system", "product", "serial", "ABC123"),
    ];
    let mut bindings = Bindings::new();
    let mut exported = Bindings::new();
    let _ = match_all(&inventory, &specs, &mut bindings, &mut exported);
});
