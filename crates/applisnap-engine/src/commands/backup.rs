//! Backup orchestration.
//!
//! ## Sequence
//! 1. Acquire the data directory run lock
//! 2. Host check (reachability + supported version)
//! 3. Resolve a procedure for every component under the configured strategy
//! 4. Allocate the snapshot and write its `strategy` and `version` markers
//! 5. Back up each component in order
//! 6. Promote the snapshot to `current`
//!
//! Any failure stops the run. `current` keeps pointing at the previous
//! snapshot and the new one keeps its `incomplete` marker.

#![allow(clippy::result_large_err)]

use super::{in_component, RunContext};
use crate::remote::{check_host, ApplianceVersion};
use applisnap_core::core_types::RunId;
use applisnap_core::errors::{cancelled, Result};
use applisnap_core::model::{Component, SnapshotId, Strategy};
use applisnap_core::{log_op_end, log_op_error, log_op_start};
use applisnap_store::snapshot::{STRATEGY_MARKER, VERSION_MARKER};
use applisnap_store::{RunLock, SnapshotStore};
use std::time::Instant;

/// Outcome of a successful backup run
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub snapshot_id: SnapshotId,
    /// Snapshot unchanged files were linked against
    pub previous: Option<SnapshotId>,
    pub strategy: Strategy,
    pub appliance_version: ApplianceVersion,
    pub components: Vec<Component>,
}

pub struct BackupOrchestrator<'a> {
    ctx: RunContext<'a>,
}

impl<'a> BackupOrchestrator<'a> {
    pub fn new(ctx: RunContext<'a>) -> Self {
        Self { ctx }
    }

    /// Run one backup to completion
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::AlreadyRunning` if another backup holds the
    /// data directory, `ExErrorKind::Connectivity` from the host check, or
    /// the first component failure (`Transfer`, `QuiesceTimeout`,
    /// `RemoteCommand`, `Cancelled`, ...) annotated with the dataset and
    /// snapshot id.
    pub fn run(&self) -> Result<BackupReport> {
        let run_id = RunId::new();
        let span = tracing::info_span!("backup", run_id = %run_id);
        let _entered = span.enter();

        let start = Instant::now();
        log_op_start!("backup", host = %self.ctx.channel.host(), strategy = %self.ctx.config.strategy);

        let result = self.execute();
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(report) => {
                log_op_end!(
                    "backup",
                    duration_ms = duration_ms,
                    snapshot_id = %report.snapshot_id
                );
            }
            Err(e) => log_op_error!("backup", e.clone(), duration_ms = duration_ms),
        }
        result
    }

    fn execute(&self) -> Result<BackupReport> {
        let config = self.ctx.config;
        let store = SnapshotStore::open(&config.data_dir)?;
        let _lock = RunLock::acquire(
            store.root(),
            &self.ctx.channel.host().to_string(),
            self.ctx.clock.now(),
        )?;

        let appliance_version = check_host(self.ctx.channel, &config.remote.release_file)?;
        let strategy = config.strategy;
        let plan = self.ctx.registry.plan(strategy)?;

        let id = store.allocate(self.ctx.clock.now())?;
        store.write_marker(&id, STRATEGY_MARKER, strategy.as_str())?;
        store.write_marker(&id, VERSION_MARKER, &appliance_version.to_string())?;

        let snapshot_dir = store.path_of(&id);
        let previous_dir = store.previous().map(|p| store.path_of(p));
        let component_ctx = self
            .ctx
            .component_context(&snapshot_dir, previous_dir.as_deref());
        if let Some(previous) = store.previous() {
            tracing::info!(snapshot_id = %id, previous = %previous, "linking against previous snapshot");
        }

        let mut components = Vec::with_capacity(plan.len());
        for (component, procedure) in plan {
            if self.ctx.cancel.is_cancelled() {
                return Err(in_component(cancelled("backup"), component, &id));
            }

            let op = format!("backup_{}", component);
            let started = Instant::now();
            log_op_start!(op.as_str(), dataset = component.as_str(), snapshot_id = %id);

            let outcome = procedure
                .backup(&component_ctx)
                .map_err(|e| in_component(e, component, &id));
            let duration_ms = started.elapsed().as_millis() as u64;
            if let Err(e) = outcome {
                log_op_error!(op.as_str(), e.clone(), duration_ms = duration_ms, dataset = component.as_str());
                return Err(e);
            }
            log_op_end!(op.as_str(), duration_ms = duration_ms, dataset = component.as_str());
            components.push(component);
        }

        store.promote(&id)?;

        Ok(BackupReport {
            previous: store.previous().cloned(),
            snapshot_id: id,
            strategy,
            appliance_version,
            components,
        })
    }
}
