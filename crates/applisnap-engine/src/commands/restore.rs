//! Restore orchestration.
//!
//! ## Sequence
//! 1. Resolve the snapshot (explicit id or `current`), rejecting incomplete ones
//! 2. Read the `strategy` marker and resolve every component's procedure
//! 3. Host check
//! 4. Enter maintenance mode and wait for in-flight operations to drain
//! 5. Restore each component in order
//! 6. Report completion and the manual follow-up
//!
//! Steps 1-3 never change the appliance. A failed component stops the run
//! with the appliance still in maintenance mode; it is never unlocked
//! automatically.

#![allow(clippy::result_large_err)]

use super::{in_component, RunContext};
use crate::maintenance::MaintenanceController;
use crate::remote::{check_host, ApplianceVersion};
use applisnap_core::core_types::RunId;
use applisnap_core::errors::{cancelled, ExError, ExErrorKind, Result};
use applisnap_core::model::{Component, SnapshotId, Strategy};
use applisnap_core::{log_op_end, log_op_error, log_op_start};
use applisnap_store::snapshot::STRATEGY_MARKER;
use applisnap_store::SnapshotStore;
use std::time::Instant;

/// Steps the operator still has to take after a successful restore
pub const FOLLOW_UP: [&str; 2] = [
    "re-apply the appliance configuration (ghe-config-apply)",
    "take the appliance out of maintenance mode (applisnap maintenance disable)",
];

/// Outcome of a successful restore run
#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub snapshot_id: SnapshotId,
    pub strategy: Strategy,
    pub appliance_version: ApplianceVersion,
    pub components: Vec<Component>,
    pub follow_up: Vec<&'static str>,
}

pub struct RestoreOrchestrator<'a> {
    ctx: RunContext<'a>,
}

impl<'a> RestoreOrchestrator<'a> {
    pub fn new(ctx: RunContext<'a>) -> Self {
        Self { ctx }
    }

    /// Restore the snapshot named by `reference` onto the appliance
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::SnapshotNotFound`, `SnapshotIncomplete` or
    /// `UnknownStrategy` before any remote contact, `Connectivity` from the
    /// host check, maintenance mode errors, or `RestoreComponent` naming the
    /// dataset that failed.
    pub fn run(&self, reference: &str) -> Result<RestoreReport> {
        let run_id = RunId::new();
        let span = tracing::info_span!("restore", run_id = %run_id);
        let _entered = span.enter();

        let start = Instant::now();
        log_op_start!("restore", host = %self.ctx.channel.host(), snapshot = reference);

        let result = self.execute(reference);
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(report) => {
                log_op_end!(
                    "restore",
                    duration_ms = duration_ms,
                    snapshot_id = %report.snapshot_id
                );
            }
            Err(e) => log_op_error!("restore", e.clone(), duration_ms = duration_ms),
        }
        result
    }

    fn execute(&self, reference: &str) -> Result<RestoreReport> {
        let config = self.ctx.config;
        let store = SnapshotStore::open(&config.data_dir)?;
        let id = store.resolve(reference)?;
        store.ensure_complete(&id)?;

        let strategy = read_strategy(&store, &id)?;
        let plan = self
            .ctx
            .registry
            .plan(strategy)
            .map_err(|e| e.with_snapshot_id(id.as_str()))?;

        let appliance_version = check_host(self.ctx.channel, &config.remote.release_file)?;
        tracing::info!(snapshot_id = %id, strategy = %strategy, "restoring snapshot");

        let mut maintenance = MaintenanceController::new(
            self.ctx.channel,
            &config.maintenance,
            self.ctx.clock,
            self.ctx.cancel,
        );
        maintenance.enable(false)?;

        let snapshot_dir = store.path_of(&id);
        let component_ctx = self.ctx.component_context(&snapshot_dir, None);

        let mut components = Vec::with_capacity(plan.len());
        for (component, procedure) in plan {
            if self.ctx.cancel.is_cancelled() {
                return Err(in_component(cancelled("restore"), component, &id));
            }

            let op = format!("restore_{}", component);
            let started = Instant::now();
            log_op_start!(op.as_str(), dataset = component.as_str(), snapshot_id = %id);

            let outcome = procedure.restore(&component_ctx).map_err(|e| {
                ExError::new(ExErrorKind::RestoreComponent)
                    .with_op(op.clone())
                    .with_component(component.as_str())
                    .with_snapshot_id(id.as_str())
                    .with_message(format!(
                        "restoring {} failed; remaining datasets were skipped and the appliance is still in maintenance mode",
                        component
                    ))
                    .with_source(e)
            });
            let duration_ms = started.elapsed().as_millis() as u64;
            if let Err(e) = outcome {
                log_op_error!(op.as_str(), e.clone(), duration_ms = duration_ms, dataset = component.as_str());
                return Err(e);
            }
            log_op_end!(op.as_str(), duration_ms = duration_ms, dataset = component.as_str());
            components.push(component);
        }

        Ok(RestoreReport {
            snapshot_id: id,
            strategy,
            appliance_version,
            components,
            follow_up: FOLLOW_UP.to_vec(),
        })
    }
}

/// Strategy recorded in the snapshot
///
/// Snapshots written before markers existed have none; those were always
/// tarball exports.
fn read_strategy(store: &SnapshotStore, id: &SnapshotId) -> Result<Strategy> {
    match store.read_marker(id, STRATEGY_MARKER)? {
        Some(marker) => marker
            .parse::<Strategy>()
            .map_err(|e| e.with_snapshot_id(id.as_str())),
        None => {
            tracing::warn!(snapshot_id = %id, "no strategy marker; assuming tarball");
            Ok(Strategy::Tarball)
        }
    }
}
