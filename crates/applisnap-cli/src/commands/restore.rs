//! Restore command
//!
//! Usage: applisnap restore [-v] [-s <SNAPSHOT>] [HOST]

use super::{init_logging, load_config, Session};
use applisnap_core::errors::Result;
use applisnap_engine::{RemoteChannel, RestoreOrchestrator};
use clap::Args;
use std::path::Path;

#[derive(Debug, Args)]
pub struct RestoreArgs {
    /// Debug-level logs and rsync progress
    #[arg(short, long)]
    pub verbose: bool,

    /// Snapshot id to restore
    #[arg(short, long, default_value = "current")]
    pub snapshot: String,

    /// Target appliance as [user@]host[:port]; defaults to the configured hostname
    pub host: Option<String>,
}

pub fn execute(args: RestoreArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    init_logging(&config, args.verbose);

    let session = Session::connect(config, args.host.as_deref(), args.verbose)?;
    let report = RestoreOrchestrator::new(session.ctx()).run(&args.snapshot)?;

    println!(
        "Restored snapshot {} onto {} (appliance {})",
        report.snapshot_id,
        session.channel.host(),
        report.appliance_version
    );
    println!("The appliance is still in maintenance mode. To finish:");
    for step in &report.follow_up {
        println!("  - {}", step);
    }
    Ok(())
}
