use super::{CURRENT_POINTER, INCOMPLETE_MARKER};
use crate::atomic::{atomic_symlink, atomic_write};
use crate::errors::{
    allocation_conflict, io_error, snapshot_incomplete, snapshot_not_found, Result,
};
use applisnap_core::model::SnapshotId;
use chrono::{DateTime, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Snapshot directories under one data directory
///
/// The `current` target is captured when the store is opened; `previous()`
/// keeps returning it even after `promote()` repoints the link, so every
/// component of a run links against the same prior snapshot.
#[derive(Debug)]
pub struct SnapshotStore {
    root: PathBuf,
    previous: Option<SnapshotId>,
}

impl SnapshotStore {
    /// Open the store rooted at `root`, recording the current pointer
    ///
    /// The directory does not have to exist yet; `allocate` creates it. A
    /// relative root is anchored at the working directory so snapshot paths
    /// stay valid when handed to tools that resolve them elsewhere (rsync
    /// reads `--link-dest` relative to its destination).
    ///
    /// # Errors
    ///
    /// Returns an IO error if the working directory cannot be determined or
    /// `current` exists but cannot be read.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root =
            std::path::absolute(root.as_ref()).map_err(|e| io_error("open_data_dir", e))?;
        let previous = read_pointer(&root)?;
        Ok(Self { root, previous })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a snapshot (whether or not it exists)
    pub fn path_of(&self, id: &SnapshotId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// The snapshot `current` named when this run began
    pub fn previous(&self) -> Option<&SnapshotId> {
        self.previous.as_ref()
    }

    /// The snapshot `current` names right now
    ///
    /// # Errors
    ///
    /// Returns an IO error if the link cannot be read.
    pub fn current(&self) -> Result<Option<SnapshotId>> {
        read_pointer(&self.root)
    }

    /// Create a fresh, empty snapshot directory for a run starting at `now`
    ///
    /// The directory carries the `incomplete` marker until promoted.
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::Allocation` if the id's directory already
    /// exists, or an IO error.
    pub fn allocate(&self, now: DateTime<Utc>) -> Result<SnapshotId> {
        fs::create_dir_all(&self.root).map_err(|e| io_error("create_data_dir", e))?;

        let id = SnapshotId::from_timestamp(now);
        let dir = self.path_of(&id);
        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(allocation_conflict(id.as_str()))
            }
            Err(e) => return Err(io_error("allocate_snapshot", e)),
        }
        atomic_write(&dir.join(INCOMPLETE_MARKER), b"")?;

        tracing::info!(snapshot_id = %id, path = %dir.display(), "allocated snapshot");
        Ok(id)
    }

    /// Resolve an explicit snapshot id or the literal `current`
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::SnapshotNotFound` when the reference is not a
    /// snapshot id, `current` is absent, or the directory does not exist.
    pub fn resolve(&self, reference: &str) -> Result<SnapshotId> {
        let id = if reference == CURRENT_POINTER {
            self.current()?
                .ok_or_else(|| snapshot_not_found(reference))?
        } else {
            SnapshotId::parse(reference).ok_or_else(|| snapshot_not_found(reference))?
        };

        if !self.path_of(&id).is_dir() {
            return Err(snapshot_not_found(reference).with_snapshot_id(id.as_str()));
        }
        Ok(id)
    }

    pub fn is_complete(&self, id: &SnapshotId) -> bool {
        !self.path_of(id).join(INCOMPLETE_MARKER).exists()
    }

    /// # Errors
    ///
    /// Returns `ExErrorKind::SnapshotIncomplete` if the snapshot was never
    /// promoted.
    pub fn ensure_complete(&self, id: &SnapshotId) -> Result<()> {
        if self.is_complete(id) {
            Ok(())
        } else {
            Err(snapshot_incomplete(id.as_str()))
        }
    }

    /// Mark a snapshot complete and repoint `current` at it
    ///
    /// Must be the last step of a successful backup run.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the marker cannot be removed or the link
    /// cannot be swapped.
    pub fn promote(&self, id: &SnapshotId) -> Result<()> {
        let marker = self.path_of(id).join(INCOMPLETE_MARKER);
        match fs::remove_file(&marker) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_error("clear_incomplete_marker", e)),
        }
        atomic_symlink(Path::new(id.as_str()), &self.root.join(CURRENT_POINTER))?;

        tracing::info!(snapshot_id = %id, "promoted snapshot to current");
        Ok(())
    }

    /// Write a small marker file inside a snapshot
    ///
    /// # Errors
    ///
    /// Returns an IO error if the write fails.
    pub fn write_marker(&self, id: &SnapshotId, name: &str, value: &str) -> Result<()> {
        atomic_write(&self.path_of(id).join(name), format!("{}\n", value).as_bytes())
    }

    /// Read a marker file, `None` when absent
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file exists but cannot be read.
    pub fn read_marker(&self, id: &SnapshotId, name: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_of(id).join(name)) {
            Ok(text) => Ok(Some(text.trim().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("read_marker", e)),
        }
    }
}

fn read_pointer(root: &Path) -> Result<Option<SnapshotId>> {
    match fs::read_link(root.join(CURRENT_POINTER)) {
        Ok(target) => Ok(target
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(SnapshotId::parse)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error("read_current_pointer", e)),
    }
}
