//! Advisory lock file guarding a configuration directory.
//!
//! The lock is a file created with `create_new`; its existence means held.
//! Cooperating processes poll until the file disappears. The guard removes
//! the file on drop, so holding a [`LockGuard`] for the whole
//! load/modify/save sequence serializes concurrent allocations.

use hwm_config::LockSettings;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock {path} still held after {waited:?}")]
    Contended { path: PathBuf, waited: Duration },

    #[error("failed to create lock {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Polling behaviour while waiting for a lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    pub poll_interval: Duration,
    /// Log a waiting message every this many attempts.
    pub log_every: u64,
    /// `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            log_every: 30,
            timeout: None,
        }
    }
}

impl From<&LockSettings> for LockOptions {
    fn from(settings: &LockSettings) -> Self {
        Self {
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            log_every: settings.log_every.max(1),
            timeout: settings.timeout_secs.map(Duration::from_secs),
        }
    }
}

/// A held lock. Dropping it deletes the lock file.
#[derive(Debug)]
pub struct LockGuard {
    lock_path: PathBuf,
}

impl LockGuard {
    /// Make one attempt. `Ok(None)` means another holder exists.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, LockError> {
        let file = OpenOptions::new().create_new(true).write(true).open(path);
        match file {
            Ok(_) => Ok(Some(Self {
                lock_path: path.to_path_buf(),
            })),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(source) => Err(LockError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Block until the lock is acquired or the timeout elapses.
    pub fn acquire(path: &Path, options: &LockOptions) -> Result<Self, LockError> {
        let started = Instant::now();
        let mut attempts: u64 = 0;
        loop {
            if let Some(guard) = Self::try_acquire(path)? {
                debug!(path = %path.display(), attempts, "lock acquired");
                return Ok(guard);
            }

            let waited = started.elapsed();
            if let Some(timeout) = options.timeout {
                if waited >= timeout {
                    warn!(path = %path.display(), ?waited, "giving up on lock");
                    return Err(LockError::Contended {
                        path: path.to_path_buf(),
                        waited,
                    });
                }
            }
            if attempts % options.log_every.max(1) == 0 {
                debug!(path = %path.display(), attempts, "waiting for lock");
            }
            std::thread::sleep(options.poll_interval);
            attempts += 1;
        }
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}
