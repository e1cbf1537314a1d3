//! State engine tests against real configuration directories.

use hwm_common::document::parse_state;
use hwm_common::{Fact, ProfileEntry, Quota};
use hwm_core::lock::LockOptions;
use hwm_core::matcher::Matcher;
use hwm_core::state::{State, StateError, LOCK_FILENAME, STATE_FILENAME};
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).expect("write fixture");
}

fn vm_inventory(serial: &str, mac: &str) -> Vec<Fact> {
    vec![
        Fact::new("system", "product", "serial", serial),
        Fact::new("system", "product", "name", "KVM"),
        Fact::new("disk", "vda", "size", "20"),
        Fact::new("network", "eth0", "serial", mac),
        Fact::new("memory", "total", "size", "4194304"),
    ]
}

fn fast_lock() -> LockOptions {
    LockOptions {
        poll_interval: Duration::from_millis(10),
        log_every: 100,
        timeout: Some(Duration::from_secs(5)),
    }
}

/// A directory with a VM profile (2 slots, backed by a CMDB template) and
/// an unlimited fallback.
fn lab(dir: &Path) {
    write(dir, STATE_FILENAME, r#"[["vm", 2], ["fallback", "*"]]"#);
    write(
        dir,
        "vm.specs",
        r#"[
            ["system", "product", "name", "KVM"],
            ["disk", "$disk", "size", "ge(10)"],
            ["network", "eth0", "serial", "$mac"]
        ]"#,
    );
    write(dir, "vm.cmdb", r#"{"generate": {"hostname": "vm01-02", "ip": "10.1.0.1-2"}}"#);
    write(dir, "fallback.specs", r#"[["system", "product", "serial", "$serial"]]"#);
}

/// Like [`lab`], but VMs are looked up by a MAC already recorded in the CMDB.
fn forced_lab(dir: &Path, cmdb: &str) {
    lab(dir);
    write(
        dir,
        "vm.specs",
        r#"[
            ["system", "product", "name", "KVM"],
            ["disk", "$disk", "size", "ge(10)"],
            ["network", "eth0", "serial", "$$mac"]
        ]"#,
    );
    write(dir, "vm.cmdb", cmdb);
}

#[test]
fn empty_state_is_exhausted() {
    let dir = tempdir().expect("tempdir");
    let mut state = State::with_config_dir(Vec::new(), dir.path());
    let err = state.find_match(&[]).unwrap_err();
    assert!(matches!(err, StateError::NoProfileAvailable { .. }));
}

#[test]
fn specs_equal_to_inventory_match_without_bindings() {
    let dir = tempdir().expect("tempdir");
    write(dir.path(), "hw.specs", r#"[["a", "b", "c", "d"]]"#);
    let mut state = State::with_config_dir(
        vec![ProfileEntry::new("hw", Quota::Remaining(2))],
        dir.path(),
    );
    let found = state
        .find_match(&[Fact::new("a", "b", "c", "d")])
        .expect("match");
    assert_eq!(found.profile, "hw");
    assert!(found.bindings.is_empty());
    assert_eq!(state.remaining("hw"), Some(Quota::Remaining(1)));
}

#[test]
fn allocation_lifecycle() {
    let dir = tempdir().expect("tempdir");
    lab(dir.path());

    // First VM claims vm01.
    let mut state = State::load(dir.path()).expect("load");
    let first = state
        .find_match(&vm_inventory("S1", "52:54:00:00:00:01"))
        .expect("match");
    assert_eq!(first.profile, "vm");
    assert_eq!(first.bindings["hostname"], json!("vm01"));
    assert_eq!(first.bindings["mac"], json!("52:54:00:00:00:01"));
    state.save().expect("save");
    drop(state);

    // Same VM again is reattached to vm01.
    let mut state = State::load(dir.path()).expect("load");
    let again = state
        .find_match(&vm_inventory("S1", "52:54:00:00:00:01"))
        .expect("match");
    assert_eq!(again.bindings["hostname"], json!("vm01"));
    assert_eq!(state.remaining("vm"), Some(Quota::Remaining(0)));
    state.save().expect("save");
    drop(state);

    // Quota exhausted: the next VM lands on the fallback profile.
    let mut state = State::load(dir.path()).expect("load");
    let other = state
        .find_match(&vm_inventory("S2", "52:54:00:00:00:02"))
        .expect("match");
    assert_eq!(other.profile, "fallback");
    assert_eq!(other.bindings["serial"], json!("S2"));

    // A failed deployment gives the slot back.
    assert!(state.failed_profile("vm"));
    state.save().expect("save");
    drop(state);

    let content = fs::read_to_string(dir.path().join(STATE_FILENAME)).expect("state");
    let entries = parse_state(&content).expect("parse");
    assert_eq!(
        entries,
        vec![
            ProfileEntry::new("vm", Quota::Remaining(1)),
            ProfileEntry::new("fallback", Quota::Unlimited),
        ]
    );
    assert!(dir.path().join("vm.cmdb.orig").exists());
    assert!(!dir.path().join(LOCK_FILENAME).exists());
}

#[test]
fn forced_mac_without_record_falls_back() {
    let dir = tempdir().expect("tempdir");
    forced_lab(
        dir.path(),
        r#"[{"hostname": "vm01", "mac": "aa"}, {"hostname": "vm02", "mac": "bb"}]"#,
    );
    let mut state = State::load(dir.path()).expect("load");
    let found = state
        .find_match(&vm_inventory("S3", "52:54:00:00:00:03"))
        .expect("match");
    assert_eq!(found.profile, "fallback");
    // The attempt on "vm" consumed a slot even though no record was found.
    assert_eq!(state.remaining("vm"), Some(Quota::Remaining(1)));
}

#[test]
fn hardware_info_after_allocation() {
    let dir = tempdir().expect("tempdir");
    forced_lab(
        dir.path(),
        r#"[{"hostname": "vm01", "mac": "52:54:00:00:00:01"}, {"hostname": "vm02", "mac": "bb"}]"#,
    );
    let mut state = State::load(dir.path()).expect("load");
    let found = state
        .find_match(&vm_inventory("S1", "52:54:00:00:00:01"))
        .expect("match");
    assert_eq!(found.bindings["hostname"], json!("vm01"));
    state.save().expect("save");

    let info = state.hardware_info("vm01").expect("info");
    assert_eq!(info.disks.len(), 1);
    assert_eq!(info.disks[0].size, "10Gi");
    assert_eq!(info.nics.len(), 1);
    assert_eq!(info.nics[0].mac, "52:54:00:00:00:01");
    assert!(state.hardware_info("vm99").expect("info").is_empty());
}

#[test]
fn concurrent_loaders_are_serialized() {
    let dir = tempdir().expect("tempdir");
    write(dir.path(), STATE_FILENAME, r#"[["hw", 10]]"#);
    write(dir.path(), "hw.specs", r#"[["disk", "$disk", "size", "$size"]]"#);

    let holder = State::load_with(dir.path(), &fast_lock(), Matcher::default()).expect("load");
    let path = dir.path().to_path_buf();
    let (tx, rx) = mpsc::channel();
    let waiter = thread::spawn(move || {
        tx.send(()).expect("signal");
        let mut state = State::load_with(&path, &fast_lock(), Matcher::default()).expect("load");
        state
            .find_match(&[Fact::new("disk", "sda", "size", "100")])
            .expect("match");
        state.save().expect("save");
    });

    rx.recv().expect("waiter started");
    thread::sleep(Duration::from_millis(50));
    assert!(dir.path().join(LOCK_FILENAME).exists());
    drop(holder);
    waiter.join().expect("waiter");

    let reloaded = State::load(dir.path()).expect("reload");
    assert_eq!(reloaded.remaining("hw"), Some(Quota::Remaining(9)));
}

#[test]
fn lock_timeout_reports_contention() {
    let dir = tempdir().expect("tempdir");
    write(dir.path(), STATE_FILENAME, "[]");
    let _holder = State::load(dir.path()).expect("load");
    let options = LockOptions {
        poll_interval: Duration::from_millis(5),
        log_every: 1,
        timeout: Some(Duration::from_millis(30)),
    };
    let err = State::load_with(dir.path(), &options, Matcher::default()).unwrap_err();
    assert!(matches!(err, StateError::Lock(_)));
}
