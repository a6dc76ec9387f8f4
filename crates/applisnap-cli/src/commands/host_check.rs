//! Host check command
//!
//! Usage: applisnap host-check [HOST]

use super::{init_logging, load_config, Session};
use applisnap_core::errors::Result;
use applisnap_engine::remote::check_host;
use applisnap_engine::RemoteChannel;
use clap::Args;
use std::path::Path;

#[derive(Debug, Args)]
pub struct HostCheckArgs {
    /// Target appliance; defaults to the configured hostname
    pub host: Option<String>,
}

pub fn execute(args: HostCheckArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    init_logging(&config, false);

    let session = Session::connect(config, args.host.as_deref(), false)?;
    let version = check_host(&session.channel, &session.config.remote.release_file)?;

    println!(
        "{} is reachable and runs supported version {}",
        session.channel.host(),
        version
    );
    Ok(())
}
