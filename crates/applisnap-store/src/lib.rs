//! applisnap Store - local snapshot directory layout
//!
//! Provides:
//! - Snapshot directory allocation, resolution and promotion
//! - The `current` pointer, swapped atomically
//! - Marker files (`strategy`, `version`, `incomplete`)
//! - A data directory run lock so only one backup runs at a time

pub mod atomic;
pub mod errors;
pub mod lock;
pub mod snapshot;

// Re-export key types
pub use errors::Result;
pub use lock::RunLock;
pub use snapshot::SnapshotStore;
