//! Structured event vocabulary.
//!
//! Log calls attach `event = event_names::X` so JSONL consumers can key on a
//! stable name instead of the message text.

use serde::{Deserialize, Serialize};

/// Log levels as they appear in JSONL output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Phases of one `hwm` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and configuration.
    Init,
    /// Lock acquisition and state loading.
    Load,
    /// Spec matching against the inventory.
    Match,
    /// Quota and CMDB bookkeeping.
    Allocate,
    /// Writing state and CMDB files.
    Persist,
    /// Producing command output.
    Report,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Load => "load",
            Stage::Match => "match",
            Stage::Allocate => "allocate",
            Stage::Persist => "persist",
            Stage::Report => "report",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    // Config
    pub const CONFIG_RESOLVED: &str = "config.resolved";
    pub const CONFIG_ERROR: &str = "config.error";

    // State
    pub const STATE_LOADED: &str = "state.loaded";
    pub const STATE_SAVED: &str = "state.saved";
    pub const STATE_SAVE_FAILED: &str = "state.save_failed";
    pub const SPECS_MISSING: &str = "state.specs_missing";
    pub const SPECS_INVALID: &str = "state.specs_invalid";
    pub const PROFILE_TESTED: &str = "state.profile_tested";
    pub const PROFILE_MATCHED: &str = "state.profile_matched";
    pub const QUOTA_DECREMENTED: &str = "state.quota_decremented";
    pub const FAILURE_REPORTED: &str = "state.failure_reported";

    // CMDB
    pub const CMDB_UPDATED: &str = "cmdb.updated";
    pub const CMDB_ALLOCATION_FAILED: &str = "cmdb.allocation_failed";
    pub const CMDB_SAVE_FAILED: &str = "cmdb.save_failed";
    pub const CMDB_INVALID: &str = "cmdb.invalid";
}
