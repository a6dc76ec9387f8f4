//! applisnap CLI
//!
//! Command-line interface for appliance backup and restore

use applisnap_core::errors::EXIT_USAGE;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "applisnap")]
#[command(about = "applisnap - Appliance backup and restore", long_about = None)]
struct Cli {
    /// Config file (TOML); built-in defaults when omitted
    #[arg(long, global = true, env = "APPLISNAP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Take a new snapshot of the configured appliance
    Backup(commands::backup::BackupArgs),
    /// Restore a snapshot onto an appliance
    Restore(commands::restore::RestoreArgs),
    /// Lock or unlock the appliance for maintenance
    Maintenance(commands::maintenance::MaintenanceArgs),
    /// Check that the appliance is reachable and supported
    HostCheck(commands::host_check::HostCheckArgs),
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version also come through here
            let code = if e.use_stderr() { EXIT_USAGE } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Backup(args) => commands::backup::execute(args, config),
        Commands::Restore(args) => commands::restore::execute(args, config),
        Commands::Maintenance(args) => commands::maintenance::execute(args, config),
        Commands::HostCheck(args) => commands::host_check::execute(args, config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}
