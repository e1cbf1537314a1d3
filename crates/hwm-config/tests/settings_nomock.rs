//! No-mock settings + resolution tests against a real directory tree.

use hwm_config::{load_settings, resolve_config_dir, ConfigSource, Settings};
use std::fs;
use tempfile::TempDir;

#[test]
fn explicit_dir_resolves_and_loads_settings() {
    let dir = TempDir::new().expect("tempdir");
    fs::write(
        dir.path().join("settings.json"),
        r#"{"schema_version": "1.0.0", "lock": {"poll_interval_ms": 10, "log_every": 5}}"#,
    )
    .expect("write settings");

    let resolved = resolve_config_dir(Some(dir.path()));
    assert_eq!(resolved.source, ConfigSource::CliArgument);

    let (settings, path) = load_settings(&resolved.path).expect("load settings");
    assert_eq!(path.as_deref(), Some(dir.path().join("settings.json").as_path()));
    assert_eq!(settings.lock.poll_interval_ms, 10);
    assert_eq!(settings.lock.log_every, 5);
    assert_eq!(settings.lock.timeout_secs, None);
}

#[test]
fn settings_round_trip_through_json() {
    let settings = Settings::default();
    let json = serde_json::to_string(&settings).expect("serialize");
    let back: Settings = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(settings, back);
}
