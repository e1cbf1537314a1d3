//! Exit codes for the `hwm` CLI.
//!
//! Exit code ranges:
//! - 0-2: Allocation outcomes (parse outcome from code, not output)
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors

use crate::cmdb::CmdbError;
use crate::lock::LockError;
use crate::state::StateError;

/// Exit codes for hwm operations.
///
/// These codes are a stable contract for provisioning scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Outcomes (0-2)
    // ========================================================================
    /// Success: profile matched, command completed
    Ok = 0,

    /// Profiles had quota left but none matched the hardware
    NoMatch = 1,

    /// No profile had any quota left
    NoQuota = 2,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments or unreadable input
    ArgsError = 10,

    /// Invalid settings or missing configuration directory
    ConfigError = 11,

    /// Lock contention (another hwm instance holds the lock)
    LockError = 14,

    /// Malformed spec file or predicate
    SpecError = 15,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Ok
    }

    /// Codes 10-19 can be resolved by user action.
    pub fn is_user_error(self) -> bool {
        let code = self as i32;
        (10..20).contains(&code)
    }

    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20
    }

    /// Get the error code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Ok => "OK",
            ExitCode::NoMatch => "NO_MATCH",
            ExitCode::NoQuota => "NO_QUOTA",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::LockError => "ERR_LOCK",
            ExitCode::SpecError => "ERR_SPEC",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

impl From<&LockError> for ExitCode {
    fn from(err: &LockError) -> Self {
        match err {
            LockError::Contended { .. } => ExitCode::LockError,
            LockError::Io { .. } => ExitCode::IoError,
        }
    }
}

impl From<&CmdbError> for ExitCode {
    fn from(err: &CmdbError) -> Self {
        match err {
            CmdbError::NoMatchingEntry | CmdbError::NoMoreEntries => ExitCode::NoMatch,
            CmdbError::Io { .. } => ExitCode::IoError,
            CmdbError::Parse { .. } => ExitCode::ConfigError,
        }
    }
}

impl From<&StateError> for ExitCode {
    fn from(err: &StateError) -> Self {
        match err {
            StateError::NoProfileAvailable { .. } => ExitCode::NoQuota,
            StateError::NoMatch { .. } => ExitCode::NoMatch,
            StateError::NoConfigDir => ExitCode::ConfigError,
            StateError::Lock(e) => e.into(),
            StateError::Io { .. } => ExitCode::IoError,
            StateError::Parse { .. } => ExitCode::ConfigError,
            StateError::Predicate(_) => ExitCode::SpecError,
        }
    }
}
