//! Typed `settings.json`.
//!
//! The file is optional; every field has a default matching the historical
//! behavior (poll the lock every second forever, cap backtracking at 50).

use crate::validate::{validate_settings, ValidationError};
use hwm_common::SCHEMA_VERSION;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Settings file name inside the configuration directory.
pub const SETTINGS_FILENAME: &str = "settings.json";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Semantic validation failed: {0}")]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub schema_version: String,
    pub lock: LockSettings,
    pub matcher: MatcherSettings,
}

/// Advisory lock polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    /// Delay between two acquisition attempts.
    pub poll_interval_ms: u64,
    /// Log a "waiting for lock" line every N attempts.
    pub log_every: u64,
    /// Give up after this many seconds. `None` waits forever.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherSettings {
    /// Maximum backtracking recursion depth.
    pub max_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            schema_version: SCHEMA_VERSION.to_string(),
            lock: LockSettings::default(),
            matcher: MatcherSettings::default(),
        }
    }
}

impl Default for LockSettings {
    fn default() -> Self {
        LockSettings {
            poll_interval_ms: 1000,
            log_every: 30,
            timeout_secs: None,
        }
    }
}

impl Default for MatcherSettings {
    fn default() -> Self {
        MatcherSettings { max_depth: 50 }
    }
}

impl Settings {
    /// Load settings from a specific file and validate them.
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let settings: Settings =
            serde_json::from_str(&content).map_err(|e| SettingsError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;
        validate_settings(&settings)?;
        Ok(settings)
    }
}

/// Load `<config_dir>/settings.json`, falling back to defaults when absent.
///
/// Returns the settings and the path they were read from.
pub fn load_settings(config_dir: &Path) -> Result<(Settings, Option<PathBuf>), SettingsError> {
    let path = config_dir.join(SETTINGS_FILENAME);
    if !path.exists() {
        return Ok((Settings::default(), None));
    }
    let settings = Settings::from_file(&path)?;
    Ok((settings, Some(path)))
}
