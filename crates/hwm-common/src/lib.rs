//! hwmatch common types.
//!
//! This crate provides the data model shared by the matcher, the CMDB and the
//! state engine:
//! - Inventory facts and spec patterns
//! - Profile quotas and state entries
//! - CMDB records
//! - Versioned JSON documents for every persisted file
//! - CLI output formats

pub mod document;
pub mod fact;
pub mod output;
pub mod profile;
pub mod schema;

pub use document::{CmdbDocument, DocumentError};
pub use fact::{Fact, Spec};
pub use output::OutputFormat;
pub use profile::{ProfileEntry, Quota};
pub use schema::SCHEMA_VERSION;

/// A CMDB record: one claimable real-world unit, such as a host.
pub type Record = serde_json::Map<String, serde_json::Value>;
