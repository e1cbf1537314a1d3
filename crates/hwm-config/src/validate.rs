//! Semantic validation of settings.

use crate::settings::Settings;
use hwm_common::SCHEMA_VERSION;
use thiserror::Error;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Settings validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

fn invalid(field: &str, message: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Validate settings semantically.
pub fn validate_settings(settings: &Settings) -> ValidationResult<()> {
    if settings.schema_version != SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: SCHEMA_VERSION.to_string(),
            actual: settings.schema_version.clone(),
        });
    }

    if settings.lock.poll_interval_ms == 0 {
        return Err(invalid("lock.poll_interval_ms", "must be > 0"));
    }
    if settings.lock.log_every == 0 {
        return Err(invalid("lock.log_every", "must be > 0"));
    }
    if settings.lock.timeout_secs == Some(0) {
        return Err(invalid(
            "lock.timeout_secs",
            "must be > 0 (omit it to wait forever)",
        ));
    }
    if settings.matcher.max_depth == 0 {
        return Err(invalid("matcher.max_depth", "must be > 0"));
    }

    Ok(())
}
