//! Error handling for applisnap-store
//!
//! Wraps applisnap-core ExError with store-specific helpers

use applisnap_core::errors::{ExError, ExErrorKind};

pub use applisnap_core::errors::io_error;

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Snapshot directory already exists
pub fn allocation_conflict(snapshot_id: &str) -> ExError {
    ExError::new(ExErrorKind::Allocation)
        .with_op("allocate_snapshot")
        .with_snapshot_id(snapshot_id)
        .with_message(format!("snapshot directory {} already exists", snapshot_id))
}

/// Reference does not name an existing snapshot
pub fn snapshot_not_found(reference: &str) -> ExError {
    ExError::new(ExErrorKind::SnapshotNotFound)
        .with_op("resolve_snapshot")
        .with_message(format!("no snapshot found for '{}'", reference))
}

/// Snapshot was never promoted
pub fn snapshot_incomplete(snapshot_id: &str) -> ExError {
    ExError::new(ExErrorKind::SnapshotIncomplete)
        .with_op("resolve_snapshot")
        .with_snapshot_id(snapshot_id)
        .with_message(format!(
            "snapshot {} is incomplete; its backup run did not finish",
            snapshot_id
        ))
}

/// Data directory lock is held by another run
pub fn already_running(lock_path: &str, holder: &str) -> ExError {
    ExError::new(ExErrorKind::AlreadyRunning)
        .with_op("acquire_run_lock")
        .with_message(format!(
            "a backup is already in progress ({}: {}); remove the file if that run is dead",
            lock_path, holder
        ))
}
