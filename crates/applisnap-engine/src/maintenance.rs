//! Maintenance mode.
//!
//! Locks the appliance against writes and waits for in-flight mutating
//! operations to drain. Unlocking is only ever an explicit operator action.

#![allow(clippy::result_large_err)]

use crate::remote::RemoteChannel;
use applisnap_core::clock::Clock;
use applisnap_core::config::MaintenanceSettings;
use applisnap_core::errors::{ExError, ExErrorKind, Result};
use applisnap_core::poll::{CancellationFlag, PollOutcome, Poller};
use applisnap_core::{log_op_end, log_op_error, log_op_start};
use serde::Deserialize;
use std::time::Instant;

pub const ENABLE_COMMAND: &str = "ghe-maintenance -s";
pub const DISABLE_COMMAND: &str = "ghe-maintenance -u";
pub const STATUS_COMMAND: &str = "ghe-maintenance-status --json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceState {
    Normal,
    Entering,
    Locked,
}

#[derive(Debug, Deserialize)]
struct MaintenanceStatus {
    #[serde(default)]
    connection_services: Vec<ConnectionService>,
}

#[derive(Debug, Deserialize)]
struct ConnectionService {
    name: String,
    #[serde(default)]
    number: u64,
}

/// Drives the appliance's maintenance lock
pub struct MaintenanceController<'a> {
    channel: &'a dyn RemoteChannel,
    settings: &'a MaintenanceSettings,
    clock: &'a dyn Clock,
    cancel: &'a CancellationFlag,
    state: MaintenanceState,
}

impl<'a> MaintenanceController<'a> {
    pub fn new(
        channel: &'a dyn RemoteChannel,
        settings: &'a MaintenanceSettings,
        clock: &'a dyn Clock,
        cancel: &'a CancellationFlag,
    ) -> Self {
        Self {
            channel,
            settings,
            clock,
            cancel,
            state: MaintenanceState::Normal,
        }
    }

    pub fn state(&self) -> MaintenanceState {
        self.state
    }

    /// Lock the appliance, then wait for active operations to reach zero
    /// unless `no_wait`
    ///
    /// The wait is unbounded unless `maintenance.timeout_secs` is set. On
    /// cancellation or timeout the lock stays engaged.
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::RemoteCommand` if the lock command fails,
    /// `ExErrorKind::Timeout` when the optional bound runs out, or
    /// `ExErrorKind::Cancelled` on interrupt.
    pub fn enable(&mut self, no_wait: bool) -> Result<()> {
        let start = Instant::now();
        log_op_start!("maintenance_enable", no_wait = no_wait);

        let result = self.lock_and_drain(no_wait);
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(()) => {
                log_op_end!("maintenance_enable", duration_ms = duration_ms);
            }
            Err(e) => log_op_error!("maintenance_enable", e.clone(), duration_ms = duration_ms),
        }
        result
    }

    fn lock_and_drain(&mut self, no_wait: bool) -> Result<()> {
        self.state = MaintenanceState::Entering;
        self.channel.exec_ok("maintenance_enable", ENABLE_COMMAND)?;

        if no_wait {
            self.state = MaintenanceState::Locked;
            return Ok(());
        }

        let poller = Poller::new(
            "maintenance_drain",
            self.settings.poll_interval(),
            self.settings.timeout(),
            self.clock,
            self.cancel,
        );
        let outcome = poller.poll(|attempt| {
            let active = self.active_operations()?;
            if active > 0 {
                tracing::info!(attempt, active, "waiting for in-flight operations to drain");
            }
            Ok(active == 0)
        })?;

        match outcome {
            PollOutcome::Ready { .. } => {
                self.state = MaintenanceState::Locked;
                Ok(())
            }
            PollOutcome::Exhausted { attempts } => Err(ExError::new(ExErrorKind::Timeout)
                .with_op("maintenance_drain")
                .with_message(format!(
                    "operations still active after {} polls; the appliance remains in maintenance mode",
                    attempts
                ))),
        }
    }

    /// Unlock the appliance
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::RemoteCommand` if the unlock command fails.
    pub fn disable(&mut self) -> Result<()> {
        let start = Instant::now();
        log_op_start!("maintenance_disable");

        let result = self
            .channel
            .exec_ok("maintenance_disable", DISABLE_COMMAND)
            .map(|_| ());
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(()) => {
                self.state = MaintenanceState::Normal;
                log_op_end!("maintenance_disable", duration_ms = duration_ms);
            }
            Err(e) => log_op_error!("maintenance_disable", e.clone(), duration_ms = duration_ms),
        }
        result
    }

    /// Sum of in-flight operations across all connection services
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::RemoteCommand` if the status command fails, or
    /// `ExErrorKind::Serialization` if its output is not the expected JSON.
    pub fn active_operations(&self) -> Result<u64> {
        let output = self.channel.exec_ok("maintenance_status", STATUS_COMMAND)?;
        let status: MaintenanceStatus = serde_json::from_slice(&output.stdout).map_err(|e| {
            ExError::new(ExErrorKind::Serialization)
                .with_op("maintenance_status")
                .with_message(format!("unexpected maintenance status output: {}", e))
        })?;

        for service in status.connection_services.iter().filter(|s| s.number > 0) {
            tracing::debug!(service = %service.name, active = service.number, "active connections");
        }
        Ok(status.connection_services.iter().map(|s| s.number).sum())
    }
}
