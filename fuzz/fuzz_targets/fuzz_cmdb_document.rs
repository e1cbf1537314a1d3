//! Fuzz target for `.cmdb` parsing and template expansion.

#![no_main]

use hwm_common::document::parse_cmdb;
use hwm_common::CmdbDocument;
use hwm_core::generate::generate;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(CmdbDocument::Template(model)) = parse_cmdb(text) {
        // Huge ranges are legal but slow to expand.
        if longest_digit_run(text) <= 1 {
            let _ = generate(&model);
        }
    }
});

fn longest_digit_run(text: &str) -> usize {
    text.split(|c: char| !c.is_ascii_digit())
        .map(str::len)
        .max()
        .unwrap_or(0)
}
