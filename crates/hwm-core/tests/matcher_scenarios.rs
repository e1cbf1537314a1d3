//! Fixture-driven matcher, generator and CMDB scenarios.

use hwm_common::document::parse_specs;
use hwm_common::{Fact, Record, Spec};
use hwm_core::cmdb::update_cmdb;
use hwm_core::generate::{generate, merge};
use hwm_core::matcher::{match_all, match_spec, Bindings};
use serde_json::{json, Value};

fn facts(rows: &[(&str, &str, &str, &str)]) -> Vec<Fact> {
    rows.iter().map(|&row| Fact::from(row)).collect()
}

fn specs(rows: &[(&str, &str, &str, &str)]) -> Vec<Spec> {
    rows.iter().map(|&row| Spec::from(row)).collect()
}

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

fn run(inventory: &[Fact], specs: &[Spec]) -> Option<Bindings> {
    let mut bindings = Bindings::new();
    let mut exported = Bindings::new();
    match_all(inventory, specs, &mut bindings, &mut exported)
        .expect("no predicate errors")
        .then_some(bindings)
}

fn disk_array() -> Vec<Fact> {
    let mut rows = vec![Fact::new("system", "product", "serial", "CZJ31402CD")];
    let disks = [
        ("1I:1:1", "1000GB", "SATA"),
        ("1I:1:2", "1000GB", "SATA"),
        ("1I:1:3", "1000GB", "SATA"),
        ("1I:1:4", "1000GB", "SATA"),
        ("2I:1:5", "1000GB", "SATA"),
        ("2I:1:6", "1000GB", "SATA"),
        ("2I:1:7", "100GB", "SSDSATA"),
        ("2I:1:8", "100GB", "SSDSATA"),
    ];
    for (id, size, kind) in disks {
        rows.push(Fact::new("disk", id, "size", size));
        rows.push(Fact::new("disk", id, "type", kind));
        rows.push(Fact::new("disk", id, "control", "hpa"));
    }
    rows
}

// ============================================================================
// Matcher
// ============================================================================

#[test]
fn exact_serial_consumes_inventory() {
    let mut inventory = facts(&[("system", "product", "serial", "CZJ31402CD")]);
    let spec = Spec::new("system", "product", "serial", "CZJ31402CD");
    let mut bindings = Bindings::new();

    let matched = match_spec(&spec, &mut inventory, &mut bindings).expect("match");
    assert_eq!(
        matched,
        Some(Fact::new("system", "product", "serial", "CZJ31402CD"))
    );
    assert!(inventory.is_empty());
    assert!(bindings.is_empty());
}

#[test]
fn eight_disks_bind_to_distinct_ids() {
    let wanted = specs(&[
        ("system", "product", "serial", "CZJ31402CD"),
        ("disk", "$disk1", "size", "100GB"),
        ("disk", "$disk2", "size", "100GB"),
        ("disk", "$disk3", "size", "1000GB"),
        ("disk", "$disk4", "size", "1000GB"),
        ("disk", "$disk5", "size", "1000GB"),
        ("disk", "$disk6", "size", "1000GB"),
        ("disk", "$disk7", "size", "1000GB"),
        ("disk", "$disk8", "size", "1000GB"),
    ]);

    let bindings = run(&disk_array(), &wanted).expect("match");
    let expected: Bindings = [
        ("disk1", "2I:1:7"),
        ("disk2", "2I:1:8"),
        ("disk3", "1I:1:1"),
        ("disk4", "1I:1:2"),
        ("disk5", "1I:1:3"),
        ("disk6", "1I:1:4"),
        ("disk7", "2I:1:5"),
        ("disk8", "2I:1:6"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    assert_eq!(bindings, expected);
}

#[test]
fn ninth_disk_is_not_found() {
    let mut wanted = specs(&[
        ("disk", "$disk1", "size", "100GB"),
        ("disk", "$disk2", "size", "100GB"),
    ]);
    wanted.push(Spec::new("disk", "$disk3", "size", "100GB"));
    assert!(run(&disk_array(), &wanted).is_none());
}

#[test]
fn backtracking_picks_the_disk_with_both_properties() {
    let inventory = facts(&[
        ("disk", "vda", "size", "8"),
        ("disk", "vda", "type", "a"),
        ("disk", "vdb", "size", "8"),
        ("disk", "vdb", "type", "b"),
    ]);
    let wanted = specs(&[("disk", "$disk", "size", "8"), ("disk", "$disk", "type", "b")]);
    let bindings = run(&inventory, &wanted).expect("match");
    assert_eq!(bindings["disk"], "vdb");

    let wanted = specs(&[
        ("disk", "$disk", "size", "8"),
        ("disk", "$disk", "type", "b"),
        ("disk", "$disk2", "size", "8"),
    ]);
    let bindings = run(&inventory, &wanted).expect("match");
    assert_eq!(bindings["disk"], "vdb");
    assert_eq!(bindings["disk2"], "vda");

    let wanted = specs(&[
        ("disk", "$disk", "size", "8"),
        ("disk", "$disk", "type", "c"),
        ("disk", "$disk2", "size", "8"),
    ]);
    assert!(run(&inventory, &wanted).is_none());
}

#[test]
fn long_backtrack_over_mixed_vendor_disks() {
    let inventory: Vec<Fact> =
        serde_json::from_str(include_str!("fixtures/x8_inventory.json")).expect("inventory");
    let wanted = parse_specs(include_str!("fixtures/x8_long.specs")).expect("specs");

    let bindings = run(&inventory, &wanted).expect("match");
    let mut disks: Vec<&String> = (1..=8)
        .map(|i| &bindings[&format!("disk{i}")])
        .collect();
    disks.sort();
    disks.dedup();
    assert_eq!(disks.len(), 8, "every disk variable binds a distinct disk");
}

#[test]
fn exported_variables_are_reported_separately() {
    let inventory = facts(&[
        ("network", "eth0", "serial", "aa:bb:cc:dd:ee:ff"),
        ("disk", "sda", "size", "100"),
    ]);
    let wanted = specs(&[
        ("network", "eth0", "serial", "$$mac"),
        ("disk", "$disk", "size", "ge(50)"),
    ]);
    let mut bindings = Bindings::new();
    let mut exported = Bindings::new();
    assert!(match_all(&inventory, &wanted, &mut bindings, &mut exported).expect("match"));
    assert_eq!(bindings["mac"], "aa:bb:cc:dd:ee:ff");
    assert_eq!(bindings["disk"], "sda");
    assert_eq!(exported.len(), 1);
    assert_eq!(exported["mac"], "aa:bb:cc:dd:ee:ff");
}

// ============================================================================
// Generator
// ============================================================================

#[test]
fn ip_range_expands_in_order() {
    let records = generate(&record(json!({"ip": "192.168.1.10-12"})));
    let ips: Vec<&Value> = records.iter().map(|r| &r["ip"]).collect();
    assert_eq!(
        ips,
        vec![
            &json!("192.168.1.10"),
            &json!("192.168.1.11"),
            &json!("192.168.1.12")
        ]
    );
}

#[test]
fn hostname_range_keeps_zero_padding() {
    let records = generate(&record(json!({"hostname": "ceph001-006"})));
    assert_eq!(records.len(), 6);
    assert_eq!(records[0]["hostname"], json!("ceph001"));
    assert_eq!(records[5]["hostname"], json!("ceph006"));
}

#[test]
fn realistic_cmdb_template() {
    let template = record(json!({
        "hostname": "node10-13",
        "ip": "10.0.0.10-13",
        "gateway": "10.0.0.1",
        "disks": ["sda", "sdb", "sdc"],
    }));
    let records = generate(&template);
    // The disk list is shortest and stops the expansion.
    assert_eq!(records.len(), 3);
    assert_eq!(
        records[2],
        record(json!({
            "hostname": "node12",
            "ip": "10.0.0.12",
            "gateway": "10.0.0.1",
            "disks": "sdc",
        }))
    );
}

#[test]
fn merge_concatenates_and_recurses() {
    let mut user = record(json!({"a": [1, 2]}));
    merge(&mut user, &record(json!({"a": [3, 4]})));
    assert_eq!(user, record(json!({"a": [1, 2, 3, 4]})));

    let mut user = record(json!({"a": {"b": 2}}));
    merge(&mut user, &record(json!({"a": {"c": 3}})));
    assert_eq!(user, record(json!({"a": {"b": 2, "c": 3}})));
}

// ============================================================================
// CMDB
// ============================================================================

#[test]
fn used_record_is_reused_unchanged() {
    let mut records = vec![record(json!({"a": 1, "used": 1}))];
    let mut binding = record(json!({"a": 1}));
    let pref = record(json!({"a": 1}));
    update_cmdb(&mut records, &mut binding, &pref, false).expect("reuse");
    assert_eq!(records, vec![record(json!({"a": 1, "used": 1}))]);
}

#[test]
fn allocation_walks_records_in_order() {
    let mut records: Vec<Record> = generate(&record(json!({"hostname": "node1-3"})));
    for expected in ["node1", "node2", "node3"] {
        let mut binding = record(json!({"serial": expected.to_uppercase()}));
        let pref = binding.clone();
        update_cmdb(&mut records, &mut binding, &pref, false).expect("claim");
        assert_eq!(binding["hostname"], json!(expected));
    }
    let mut binding = record(json!({"serial": "NODE4"}));
    let pref = binding.clone();
    assert!(update_cmdb(&mut records, &mut binding, &pref, false).is_err());
}
