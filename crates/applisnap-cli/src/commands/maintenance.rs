//! Maintenance command
//!
//! Usage: applisnap maintenance enable [--no-wait] [HOST]
//!        applisnap maintenance disable [HOST]

use super::{init_logging, load_config, Session};
use applisnap_core::errors::Result;
use applisnap_engine::maintenance::MaintenanceController;
use applisnap_engine::RemoteChannel;
use clap::{Args, Subcommand};
use std::path::Path;

#[derive(Debug, Args)]
pub struct MaintenanceArgs {
    #[command(subcommand)]
    pub command: MaintenanceCommand,
}

#[derive(Debug, Subcommand)]
pub enum MaintenanceCommand {
    /// Lock the appliance and wait for in-flight operations to finish
    Enable(EnableArgs),
    /// Unlock the appliance
    Disable(DisableArgs),
}

#[derive(Debug, Args)]
pub struct EnableArgs {
    /// Return as soon as the lock is set
    #[arg(long)]
    pub no_wait: bool,

    /// Target appliance; defaults to the configured hostname
    pub host: Option<String>,
}

#[derive(Debug, Args)]
pub struct DisableArgs {
    /// Target appliance; defaults to the configured hostname
    pub host: Option<String>,
}

pub fn execute(args: MaintenanceArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    init_logging(&config, false);

    match args.command {
        MaintenanceCommand::Enable(enable) => {
            let session = Session::connect(config, enable.host.as_deref(), false)?;
            let mut controller = MaintenanceController::new(
                &session.channel,
                &session.config.maintenance,
                &session.clock,
                &session.cancel,
            );
            controller.enable(enable.no_wait)?;
            println!("Maintenance mode enabled on {}", session.channel.host());
        }
        MaintenanceCommand::Disable(disable) => {
            let session = Session::connect(config, disable.host.as_deref(), false)?;
            let mut controller = MaintenanceController::new(
                &session.channel,
                &session.config.maintenance,
                &session.clock,
                &session.cancel,
            );
            controller.disable()?;
            println!("Maintenance mode disabled on {}", session.channel.host());
        }
    }
    Ok(())
}
