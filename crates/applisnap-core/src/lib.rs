//! applisnap Core - shared kernel for appliance backup and restore
//!
//! This crate provides the pieces every other applisnap crate builds on:
//! - Canonical error facility (`ExError`, `ExErrorKind`) with stable codes and
//!   process exit codes
//! - Structured logging facility (`init`, `log_op_*` macros, test capture)
//! - Immutable run configuration loaded from TOML
//! - Domain model: snapshot ids, components, transfer strategies
//! - Time source and polling primitives with cancellation

pub mod clock;
pub mod config;
pub mod errors;
pub mod logging_facility;
pub mod model;
pub mod poll;

// Logging macros resolve schema constants through this path.
pub use applisnap_core_types as core_types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, RemoteHost};
pub use errors::{ExError, ExErrorKind, Result};
pub use model::{Component, SnapshotId, Strategy};
pub use poll::{CancellationFlag, PollOutcome, Poller};
