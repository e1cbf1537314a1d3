//! hwmatch configuration loading and validation.
//!
//! This crate provides:
//! - Config directory resolution (CLI → env → XDG → system)
//! - Typed `settings.json` with defaults
//! - Semantic validation of settings

pub mod resolve;
pub mod settings;
pub mod validate;

pub use resolve::{list_spec_profiles, resolve_config_dir, ConfigDir, ConfigSource};
pub use settings::{load_settings, LockSettings, MatcherSettings, Settings, SettingsError};
pub use validate::{validate_settings, ValidationError};
