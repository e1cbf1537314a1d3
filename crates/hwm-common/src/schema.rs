//! Schema versioning for persisted documents.

/// Version written into every document envelope (state, specs, cmdb).
pub const SCHEMA_VERSION: &str = "1.0.0";
