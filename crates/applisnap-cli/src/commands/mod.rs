//! Shared plumbing for every subcommand: config, logging, the appliance
//! connection and interrupt handling.

pub mod backup;
pub mod host_check;
pub mod maintenance;
pub mod restore;

use applisnap_core::clock::SystemClock;
use applisnap_core::config::Config;
use applisnap_core::errors::{ExError, ExErrorKind, Result};
use applisnap_core::logging_facility::{init, Profile};
use applisnap_core::poll::CancellationFlag;
use applisnap_engine::{ComponentRegistry, RsyncTransfer, RunContext, SshChannel};
use std::path::Path;

/// Load `path`, or the built-in defaults when no config file was given
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None => {
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

pub fn init_logging(config: &Config, verbose: bool) {
    let profile = if config.log_json {
        Profile::Production
    } else if verbose {
        Profile::Verbose
    } else {
        Profile::Development
    };
    init(profile);
}

/// Flag set by the first SIGINT or SIGTERM; runs stop at their next
/// checkpoint and release guards on the way out
fn interrupt_flag() -> Result<CancellationFlag> {
    let flag = CancellationFlag::new();
    let handler_flag = flag.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("interrupt received; stopping at the next checkpoint");
        handler_flag.cancel();
    })
    .map_err(|e| {
        ExError::new(ExErrorKind::Internal)
            .with_op("install_interrupt_handler")
            .with_message(e.to_string())
    })?;
    Ok(flag)
}

/// Collaborators for one command against one appliance
pub struct Session {
    pub config: Config,
    pub channel: SshChannel,
    pub transfer: RsyncTransfer,
    pub registry: ComponentRegistry,
    pub clock: SystemClock,
    pub cancel: CancellationFlag,
}

impl Session {
    /// Resolve the host (`host` argument first, then the config) and set up
    /// ssh, rsync and interrupt handling
    pub fn connect(config: Config, host: Option<&str>, verbose: bool) -> Result<Self> {
        let host = config.resolve_host(host)?;
        let channel = SshChannel::new(host, config.identity_file.clone());
        let transfer = RsyncTransfer::new(&channel, verbose);
        let cancel = interrupt_flag()?;

        Ok(Self {
            config,
            channel,
            transfer,
            registry: ComponentRegistry::standard(),
            clock: SystemClock,
            cancel,
        })
    }

    pub fn ctx(&self) -> RunContext<'_> {
        RunContext {
            config: &self.config,
            channel: &self.channel,
            transfer: &self.transfer,
            registry: &self.registry,
            clock: &self.clock,
            cancel: &self.cancel,
        }
    }
}
