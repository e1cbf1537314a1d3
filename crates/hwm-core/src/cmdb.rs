//! Per-profile configuration database.
//!
//! A profile's CMDB lists the real units (hosts) it can describe. A matched
//! binding is attached to a record: first by reusing a record that already
//! agrees with the binding's preferred keys, otherwise by claiming the first
//! record not yet marked `used`.

use crate::generate::{generate, is_included};
use crate::persist::write_atomic;
use hwm_common::document::{parse_cmdb, render_cmdb};
use hwm_common::{CmdbDocument, DocumentError, Record};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Marker key set on claimed records.
pub const USED_KEY: &str = "used";

#[derive(Debug, Error)]
pub enum CmdbError {
    #[error("No entry matched in the CMDB, aborting.")]
    NoMatchingEntry,

    #[error("No more entry in the CMDB, aborting.")]
    NoMoreEntries,

    #[error("failed to access CMDB {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid CMDB {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },
}

impl CmdbError {
    /// True for the two allocation failures, as opposed to I/O or format errors.
    pub fn is_allocation_failure(&self) -> bool {
        matches!(self, CmdbError::NoMatchingEntry | CmdbError::NoMoreEntries)
    }
}

pub fn cmdb_path(cfg_dir: &Path, name: &str) -> PathBuf {
    cfg_dir.join(format!("{name}.cmdb"))
}

pub fn backup_path(cfg_dir: &Path, name: &str) -> PathBuf {
    cfg_dir.join(format!("{name}.cmdb.orig"))
}

/// Read and decode a CMDB file without expanding templates.
///
/// A missing file is `Ok(None)`.
pub fn read_cmdb(cfg_dir: &Path, name: &str) -> Result<Option<CmdbDocument>, CmdbError> {
    let path = cmdb_path(cfg_dir, name);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(CmdbError::Io { path, source }),
    };
    parse_cmdb(&content)
        .map(Some)
        .map_err(|source| CmdbError::Parse { path, source })
}

/// Load a profile's records, expanding a template if the file holds one.
///
/// Returns `Ok(None)` when the file is absent. An unreadable or malformed
/// file is an error, never mistaken for a profile without a CMDB.
pub fn load_cmdb(cfg_dir: &Path, name: &str) -> Result<Option<Vec<Record>>, CmdbError> {
    let records = match read_cmdb(cfg_dir, name)? {
        Some(CmdbDocument::Records(records)) => records,
        Some(CmdbDocument::Template(model)) => {
            let records = generate(&model);
            debug!(profile = name, count = records.len(), "expanded CMDB template");
            records
        }
        None => return Ok(None),
    };
    Ok(Some(records))
}

/// Write a profile's records.
///
/// If the file on disk is still a template it is copied to `.cmdb.orig`
/// first.
pub fn save_cmdb(cfg_dir: &Path, name: &str, records: &[Record]) -> Result<(), CmdbError> {
    let path = cmdb_path(cfg_dir, name);
    if let Ok(Some(CmdbDocument::Template(_))) = read_cmdb(cfg_dir, name) {
        let backup = backup_path(cfg_dir, name);
        fs::copy(&path, &backup).map_err(|source| CmdbError::Io {
            path: backup.clone(),
            source,
        })?;
        info!(path = %backup.display(), "saved CMDB template");
    }

    let rendered = render_cmdb(records).map_err(|source| CmdbError::Parse {
        path: path.clone(),
        source,
    })?;
    write_atomic(&path, rendered.as_bytes()).map_err(|source| CmdbError::Io { path, source })
}

fn claim(records: &mut [Record], idx: usize, binding: &mut Record) {
    let entry = &mut records[idx];
    for (key, value) in binding.iter() {
        entry.insert(key.clone(), value.clone());
    }
    for (key, value) in entry.iter() {
        binding.insert(key.clone(), value.clone());
    }
    binding.insert(USED_KEY.to_string(), Value::from(1));
    *entry = binding.clone();
}

/// Attach `binding` to a record.
///
/// The record agreeing with `pref` is reused when there is one. Otherwise,
/// unless `forced`, the first unused record is claimed. On success the
/// record and `binding` hold the same merged contents, with incoming values
/// winning on conflicting keys, and the record is marked used.
pub fn update_cmdb(
    records: &mut [Record],
    binding: &mut Record,
    pref: &Record,
    forced: bool,
) -> Result<(), CmdbError> {
    if let Some(idx) = records.iter().position(|entry| is_included(pref, entry)) {
        debug!(index = idx, "reusing CMDB entry");
        claim(records, idx, binding);
        return Ok(());
    }

    if forced {
        return Err(CmdbError::NoMatchingEntry);
    }

    match records.iter().position(|entry| !entry.contains_key(USED_KEY)) {
        Some(idx) => {
            debug!(index = idx, "claiming CMDB entry");
            claim(records, idx, binding);
            Ok(())
        }
        None => Err(CmdbError::NoMoreEntries),
    }
}
