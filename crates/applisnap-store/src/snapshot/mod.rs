//! Snapshot directory management.
//!
//! Layout of the data directory:
//!
//! ```text
//! <data_dir>/
//!   current -> 20240309T070501        symlink to the latest complete snapshot
//!   in-progress                       run lock (see `crate::lock`)
//!   20240309T070501/
//!     strategy                        "rsync" or "tarball"
//!     version                         appliance release at backup time
//!     incomplete                      present until the run is promoted
//!     repositories/ pages/ mysql.sql.gz redis.rdb ...
//! ```

mod store;

pub use store::SnapshotStore;

/// Name of the pointer to the latest complete snapshot
pub const CURRENT_POINTER: &str = "current";
/// Marker recording the transfer mechanism
pub const STRATEGY_MARKER: &str = "strategy";
/// Marker recording the appliance version
pub const VERSION_MARKER: &str = "version";
/// Marker present while a snapshot's run has not been promoted
pub const INCOMPLETE_MARKER: &str = "incomplete";
