//! Command orchestration layer.
//!
//! Backup and restore runs coordinate the remote channel, the bulk transfer
//! tool, the component registry and the local snapshot store.

#![allow(clippy::result_large_err)]

pub mod backup;
pub mod restore;

use crate::components::{ComponentContext, ComponentRegistry};
use crate::remote::RemoteChannel;
use crate::transfer::BulkTransfer;
use applisnap_core::clock::Clock;
use applisnap_core::config::Config;
use applisnap_core::errors::ExError;
use applisnap_core::model::{Component, SnapshotId};
use applisnap_core::poll::CancellationFlag;
use std::path::Path;

/// Collaborators shared by one backup or restore run
#[derive(Clone, Copy)]
pub struct RunContext<'a> {
    pub config: &'a Config,
    pub channel: &'a dyn RemoteChannel,
    pub transfer: &'a dyn BulkTransfer,
    pub registry: &'a ComponentRegistry,
    pub clock: &'a dyn Clock,
    pub cancel: &'a CancellationFlag,
}

impl<'a> RunContext<'a> {
    fn component_context<'b>(
        &self,
        snapshot_dir: &'b Path,
        previous_dir: Option<&'b Path>,
    ) -> ComponentContext<'b>
    where
        'a: 'b,
    {
        ComponentContext {
            config: self.config,
            channel: self.channel,
            transfer: self.transfer,
            clock: self.clock,
            cancel: self.cancel,
            snapshot_dir,
            previous_dir,
        }
    }
}

/// Attach dataset and snapshot context, keeping a more specific dataset
/// the error may already carry
fn in_component(err: ExError, component: Component, snapshot_id: &SnapshotId) -> ExError {
    let err = if err.component().is_none() {
        err.with_component(component.as_str())
    } else {
        err
    };
    err.with_snapshot_id(snapshot_id.as_str())
}
