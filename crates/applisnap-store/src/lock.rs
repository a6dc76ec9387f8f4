//! Data directory run lock
//!
//! One coordinating run at a time per data directory. The lock is a file
//! created with `create_new`; it is removed when the `RunLock` is dropped.
//! A lock left behind by a crashed run is reported, never broken
//! automatically.

use crate::errors::{already_running, io_error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

pub const LOCK_FILE: &str = "in-progress";

#[derive(Debug, Serialize, Deserialize)]
struct LockHolder {
    pid: u32,
    host: String,
    started_at: DateTime<Utc>,
}

/// Held for the duration of a backup run
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Take the lock in `data_dir`
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::AlreadyRunning` when another run holds the lock,
    /// or an IO error.
    pub fn acquire(data_dir: &Path, host: &str, now: DateTime<Utc>) -> Result<Self> {
        fs::create_dir_all(data_dir).map_err(|e| io_error("create_data_dir", e))?;
        let path = data_dir.join(LOCK_FILE);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&path).unwrap_or_default();
                return Err(already_running(&path.display().to_string(), holder.trim()));
            }
            Err(e) => return Err(io_error("acquire_run_lock", e)),
        };

        let holder = LockHolder {
            pid: std::process::id(),
            host: host.to_string(),
            started_at: now,
        };
        let body = serde_json::to_string(&holder).unwrap_or_default();
        // The lock is in place as soon as the file exists; a short write only
        // loses the diagnostic payload.
        if let Err(e) = file.write_all(body.as_bytes()) {
            tracing::warn!(error = %e, "could not record run lock holder");
        }

        tracing::debug!(path = %path.display(), "acquired run lock");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release run lock");
        }
    }
}
