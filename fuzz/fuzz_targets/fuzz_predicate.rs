//! Fuzz target for predicate expressions.
//!
//! Tests that arbitrary expressions and field values evaluate to a result
//! or an error without panicking.

#![no_main]

use arbitrary::Arbitrary;
use hwm_core::predicate::PredicateRegistry;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input<'a> {
    expr: &'a str,
    field: &'a str,
}

fuzz_target!(|input: Input<'_>| {
    let registry = PredicateRegistry::standard();
    let _ = registry.evaluate(input.expr, input.field);
});
