//! Ordered profile state and the allocation loop.
//!
//! A state directory holds:
//! - `state`: ordered `(profile, quota)` list deciding priority and quota
//! - `lock`: advisory lock held across load, modify and save
//! - `<profile>.specs`: the spec list for each profile
//! - `<profile>.cmdb`: optional records to attach matched hardware to

pub mod hardware;

pub use hardware::{DiskInfo, HardwareInfo, NicInfo};

use crate::cmdb::{self, update_cmdb};
use crate::lock::{LockError, LockGuard, LockOptions};
use crate::logging::event_names;
use crate::matcher::{Bindings, MatchError, Matcher};
use crate::persist::write_atomic;
use hwm_common::document::{parse_specs, parse_state, render_state};
use hwm_common::{DocumentError, Fact, ProfileEntry, Quota, Record, Spec};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const STATE_FILENAME: &str = "state";
pub const LOCK_FILENAME: &str = "lock";

/// Marker value filling every position of the invalid spec.
const UNKNOWN: &str = "<unknown>";

/// Specs used for a profile whose `.specs` file is missing or unreadable.
/// Never matches real hardware.
pub fn invalid_specs() -> Vec<Spec> {
    vec![Spec::new(UNKNOWN, UNKNOWN, UNKNOWN, UNKNOWN)]
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("No more role available in {path}")]
    NoProfileAvailable { path: PathBuf },

    #[error(
        "Unable to match requirements on the following available roles in {cfg_dir}: {}",
        .profiles.join(", ")
    )]
    NoMatch {
        cfg_dir: PathBuf,
        profiles: Vec<String>,
    },

    #[error("no configuration directory set")]
    NoConfigDir,

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid state file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },

    #[error(transparent)]
    Predicate(#[from] MatchError),
}

/// Result of a successful [`State::find_match`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileMatch {
    pub profile: String,
    /// Matched variables, merged with the claimed CMDB record if any.
    pub bindings: Record,
}

/// Profile entries plus the files they were loaded from.
#[derive(Debug)]
pub struct State {
    entries: Vec<ProfileEntry>,
    cfg_dir: Option<PathBuf>,
    state_path: Option<PathBuf>,
    lock: Option<LockGuard>,
    matcher: Matcher,
}

impl State {
    /// In-memory state with no backing directory.
    pub fn new(entries: Vec<ProfileEntry>) -> Self {
        State {
            entries,
            cfg_dir: None,
            state_path: None,
            lock: None,
            matcher: Matcher::default(),
        }
    }

    /// State reading specs and CMDBs from `cfg_dir` without taking the lock.
    pub fn with_config_dir(entries: Vec<ProfileEntry>, cfg_dir: impl Into<PathBuf>) -> Self {
        let cfg_dir = cfg_dir.into();
        State {
            state_path: Some(cfg_dir.join(STATE_FILENAME)),
            cfg_dir: Some(cfg_dir),
            ..State::new(entries)
        }
    }

    /// Replace the matcher, e.g. to register extra predicates.
    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Lock `cfg_dir` and read its state file with default lock options.
    pub fn load(cfg_dir: &Path) -> Result<Self, StateError> {
        Self::load_with(cfg_dir, &LockOptions::default(), Matcher::default())
    }

    /// Lock `cfg_dir` and read its state file.
    ///
    /// The lock stays held until [`State::unlock`] or drop. If reading fails
    /// the lock is released before returning.
    pub fn load_with(
        cfg_dir: &Path,
        lock_options: &LockOptions,
        matcher: Matcher,
    ) -> Result<Self, StateError> {
        let lock_path = cfg_dir.join(LOCK_FILENAME);
        let guard = LockGuard::acquire(&lock_path, lock_options)?;

        let state_path = cfg_dir.join(STATE_FILENAME);
        info!(path = %state_path.display(), "reading state");
        let content = fs::read_to_string(&state_path).map_err(|source| StateError::Io {
            path: state_path.clone(),
            source,
        })?;
        let entries = parse_state(&content).map_err(|source| StateError::Parse {
            path: state_path.clone(),
            source,
        })?;
        debug!(
            event = event_names::STATE_LOADED,
            profiles = entries.len(),
            "state loaded"
        );

        Ok(State {
            entries,
            cfg_dir: Some(cfg_dir.to_path_buf()),
            state_path: Some(state_path),
            lock: Some(guard),
            matcher,
        })
    }

    pub fn entries(&self) -> &[ProfileEntry] {
        &self.entries
    }

    pub fn config_dir(&self) -> Option<&Path> {
        self.cfg_dir.as_deref()
    }

    pub fn state_path(&self) -> Option<&Path> {
        self.state_path.as_deref()
    }

    /// Quota of the first entry named `name`.
    pub fn remaining(&self, name: &str) -> Option<Quota> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.quota)
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    /// Release the lock early. Dropping the state has the same effect.
    pub fn unlock(&mut self) {
        self.lock = None;
    }

    /// Give a slot back to `name` after a downstream failure.
    ///
    /// Returns true when the state changed and should be saved. Unlimited
    /// and unknown profiles are left alone.
    pub fn failed_profile(&mut self, name: &str) -> bool {
        info!(event = event_names::FAILURE_REPORTED, profile = name, "received failure for role");
        let Some(entry) = self.entries.iter_mut().find(|entry| entry.name == name) else {
            return false;
        };
        match entry.quota.increment() {
            Some(quota) => {
                entry.quota = quota;
                true
            }
            None => false,
        }
    }

    /// Write the entries back to the state file.
    pub fn save(&self) -> Result<(), StateError> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        let rendered = render_state(&self.entries).map_err(|source| StateError::Parse {
            path: path.clone(),
            source,
        })?;
        write_atomic(path, rendered.as_bytes()).map_err(|source| StateError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(event = event_names::STATE_SAVED, path = %path.display(), "state saved");
        Ok(())
    }

    /// Specs for `name`, or [`invalid_specs`] when they cannot be read.
    pub fn load_specs(&self, name: &str) -> Vec<Spec> {
        let Some(cfg_dir) = &self.cfg_dir else {
            return invalid_specs();
        };
        let path = cfg_dir.join(format!("{name}.specs"));
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(event = event_names::SPECS_MISSING, path = %path.display(), "specs file not found");
                return invalid_specs();
            }
            Err(err) => {
                error!(event = event_names::SPECS_INVALID, path = %path.display(), error = %err, "cannot read specs");
                return invalid_specs();
            }
        };
        match parse_specs(&content) {
            Ok(specs) => specs,
            Err(err) => {
                error!(event = event_names::SPECS_INVALID, path = %path.display(), error = %err, "invalid specs");
                invalid_specs()
            }
        }
    }

    /// Find the first profile, in state order, that has quota left and
    /// whose specs match `facts`.
    ///
    /// On a match the profile's finite quota is decremented. When the
    /// profile has a CMDB, the bindings are attached to a record there; if
    /// no record can be attached, or the CMDB cannot be read, the next
    /// profile is tried, and the quota already taken from this one is not
    /// given back.
    pub fn find_match(&mut self, facts: &[Fact]) -> Result<ProfileMatch, StateError> {
        let mut available = Vec::new();

        for idx in 0..self.entries.len() {
            let ProfileEntry { name, quota } = self.entries[idx].clone();
            debug!(event = event_names::PROFILE_TESTED, profile = %name, %quota, "testing profile");
            if !quota.is_available() {
                continue;
            }
            available.push(name.clone());

            let specs = self.load_specs(&name);
            let mut vars = Bindings::new();
            let mut exported = Bindings::new();
            if !self.matcher.match_all(facts, &specs, &mut vars, &mut exported)? {
                continue;
            }
            info!(event = event_names::PROFILE_MATCHED, profile = %name, "specs matched");

            let forced = !exported.is_empty();
            let mut bindings = to_record(vars);
            let pref = if forced { to_record(exported) } else { bindings.clone() };

            if let Quota::Remaining(n) = quota {
                self.entries[idx].quota = quota.decrement();
                info!(
                    event = event_names::QUOTA_DECREMENTED,
                    profile = %name,
                    remaining = n.saturating_sub(1),
                    "decrementing quota"
                );
            }

            let records = match self.cfg_dir.as_deref().map(|dir| cmdb::load_cmdb(dir, &name)) {
                Some(Ok(records)) => records.filter(|records| !records.is_empty()),
                Some(Err(err)) => {
                    error!(
                        event = event_names::CMDB_INVALID,
                        profile = %name,
                        error = %err,
                        "unreadable CMDB, trying next profile"
                    );
                    continue;
                }
                None => None,
            };
            if let (Some(cfg_dir), Some(mut records)) = (self.cfg_dir.as_deref(), records) {
                if let Err(err) = update_cmdb(&mut records, &mut bindings, &pref, forced) {
                    warn!(
                        event = event_names::CMDB_ALLOCATION_FAILED,
                        profile = %name,
                        error = %err,
                        "no CMDB entry for match, trying next profile"
                    );
                    continue;
                }
                match cmdb::save_cmdb(cfg_dir, &name, &records) {
                    Ok(()) => info!(event = event_names::CMDB_UPDATED, profile = %name, "CMDB updated"),
                    Err(err) => error!(
                        event = event_names::CMDB_SAVE_FAILED,
                        profile = %name,
                        error = %err,
                        "failed to save CMDB"
                    ),
                }
            }

            return Ok(ProfileMatch {
                profile: name,
                bindings,
            });
        }

        if available.is_empty() {
            Err(StateError::NoProfileAvailable {
                path: self.state_path.clone().unwrap_or_default(),
            })
        } else {
            Err(StateError::NoMatch {
                cfg_dir: self.cfg_dir.clone().unwrap_or_default(),
                profiles: available,
            })
        }
    }
}

fn to_record(bindings: Bindings) -> Record {
    bindings
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect()
}
