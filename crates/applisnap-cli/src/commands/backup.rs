//! Backup command
//!
//! Usage: applisnap backup [-v]

use super::{init_logging, load_config, Session};
use applisnap_core::errors::Result;
use applisnap_engine::BackupOrchestrator;
use clap::Args;
use std::path::Path;

#[derive(Debug, Args)]
pub struct BackupArgs {
    /// Debug-level logs and rsync progress
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn execute(args: BackupArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    init_logging(&config, args.verbose);

    let session = Session::connect(config, None, args.verbose)?;
    let report = BackupOrchestrator::new(session.ctx()).run()?;

    println!(
        "Snapshot {} complete ({} strategy, appliance {})",
        report.snapshot_id, report.strategy, report.appliance_version
    );
    if let Some(previous) = &report.previous {
        println!("Unchanged files linked against {}", previous);
    }
    Ok(())
}
