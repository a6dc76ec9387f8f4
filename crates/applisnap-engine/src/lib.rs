//! applisnap Engine - Orchestration layer
//!
//! Coordinates the remote appliance, the bulk transfer tool and the local
//! snapshot store:
//! - Remote execution channel over ssh
//! - Rule-based rsync transfers with incremental linking
//! - GC quiescing and the phased repository transfer
//! - Maintenance mode locking and drain
//! - Backup and restore orchestration over a component registry

pub mod commands;
pub mod components;
pub mod maintenance;
pub mod quiesce;
pub mod remote;
pub mod repositories;
pub mod transfer;

pub use commands::backup::{BackupOrchestrator, BackupReport};
pub use commands::restore::{RestoreOrchestrator, RestoreReport};
pub use commands::RunContext;
pub use components::{ComponentContext, ComponentProcedure, ComponentRegistry};
pub use remote::{RemoteChannel, RemoteInput, RemoteOutput, RemoteSink, SshChannel};
pub use transfer::{BulkTransfer, RsyncTransfer, RuleSet, TransferRequest};
