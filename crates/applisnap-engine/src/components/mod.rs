//! Per-dataset backup and restore procedures.
//!
//! Each `(Component, Strategy)` pair maps to one `ComponentProcedure`. The
//! orchestrators only walk `Component::ORDER` and dispatch through the
//! registry; they know nothing about how a dataset is moved.

#![allow(clippy::result_large_err)]

mod archive;
mod tree;

pub use archive::RemoteArchive;
pub use tree::{RemoteDir, RsyncRepositories, RsyncTree};

use crate::remote::RemoteChannel;
use crate::transfer::BulkTransfer;
use applisnap_core::clock::Clock;
use applisnap_core::config::Config;
use applisnap_core::errors::{ExError, ExErrorKind, Result};
use applisnap_core::model::{Component, Strategy};
use applisnap_core::poll::CancellationFlag;
use std::collections::HashMap;
use std::path::Path;

/// Everything a procedure may touch during one run
pub struct ComponentContext<'a> {
    pub config: &'a Config,
    pub channel: &'a dyn RemoteChannel,
    pub transfer: &'a dyn BulkTransfer,
    pub clock: &'a dyn Clock,
    pub cancel: &'a CancellationFlag,
    /// Snapshot being written (backup) or read (restore)
    pub snapshot_dir: &'a Path,
    /// Snapshot `current` named when the run began; backup only
    pub previous_dir: Option<&'a Path>,
}

/// Backup and restore of one dataset
pub trait ComponentProcedure: Send + Sync {
    /// Copy the dataset from the appliance into `ctx.snapshot_dir`
    ///
    /// # Errors
    ///
    /// Returns the failing remote command or transfer error.
    fn backup(&self, ctx: &ComponentContext<'_>) -> Result<()>;

    /// Copy the dataset from `ctx.snapshot_dir` onto the appliance
    ///
    /// # Errors
    ///
    /// Returns the failing remote command or transfer error.
    fn restore(&self, ctx: &ComponentContext<'_>) -> Result<()>;
}

/// `(Component, Strategy) -> procedure` dispatch table
#[derive(Default)]
pub struct ComponentRegistry {
    procedures: HashMap<(Component, Strategy), Box<dyn ComponentProcedure>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Procedures for every dataset under both strategies
    pub fn standard() -> Self {
        let mut registry = Self::new();

        registry.register(
            Component::Repositories,
            Strategy::Rsync,
            Box::new(RsyncRepositories),
        );
        registry.register(
            Component::Repositories,
            Strategy::Tarball,
            Box::new(
                RemoteArchive::new(
                    "ghe-export-repositories",
                    "ghe-import-repositories",
                    "repositories.tar",
                )
                .quiesced(),
            ),
        );

        registry.register(
            Component::Pages,
            Strategy::Rsync,
            Box::new(RsyncTree::new(RemoteDir::Pages, "pages", "git")),
        );
        registry.register(
            Component::Pages,
            Strategy::Tarball,
            Box::new(RemoteArchive::new(
                "ghe-export-pages",
                "ghe-import-pages",
                "pages.tar",
            )),
        );

        registry.register(
            Component::SearchIndex,
            Strategy::Rsync,
            Box::new(RsyncTree::new(
                RemoteDir::SearchIndex,
                "elasticsearch",
                "elasticsearch",
            )),
        );
        registry.register(
            Component::SearchIndex,
            Strategy::Tarball,
            Box::new(RemoteArchive::new(
                "ghe-export-es-indices",
                "ghe-import-es-indices",
                "elasticsearch.tar",
            )),
        );

        // Dumps are produced the same way whatever the strategy
        let dumps: [(Component, &str, &str, &str); 4] = [
            (
                Component::Database,
                "ghe-export-mysql | gzip",
                "gunzip -c | ghe-import-mysql",
                "mysql.sql.gz",
            ),
            (
                Component::CacheStore,
                "ghe-export-redis",
                "ghe-import-redis",
                "redis.rdb",
            ),
            (
                Component::Credentials,
                "ghe-export-authorized-keys",
                "ghe-import-authorized-keys",
                "authorized-keys.json",
            ),
            (
                Component::HostIdentity,
                "ghe-export-ssh-host-keys",
                "ghe-import-ssh-host-keys",
                "ssh-host-keys.tar",
            ),
        ];
        for (component, export, import, file) in dumps {
            for strategy in [Strategy::Rsync, Strategy::Tarball] {
                registry.register(
                    component,
                    strategy,
                    Box::new(RemoteArchive::new(export, import, file)),
                );
            }
        }

        registry
    }

    /// Add or replace the procedure for a pair
    pub fn register(
        &mut self,
        component: Component,
        strategy: Strategy,
        procedure: Box<dyn ComponentProcedure>,
    ) {
        self.procedures.insert((component, strategy), procedure);
    }

    pub fn get(&self, component: Component, strategy: Strategy) -> Option<&dyn ComponentProcedure> {
        self.procedures
            .get(&(component, strategy))
            .map(|p| p.as_ref())
    }

    /// Procedures for every component, in `Component::ORDER`
    ///
    /// Resolved up front so a gap in the table fails before any work starts.
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::UnknownStrategy` naming the first component
    /// with no procedure for `strategy`.
    pub fn plan(&self, strategy: Strategy) -> Result<Vec<(Component, &dyn ComponentProcedure)>> {
        Component::ORDER
            .iter()
            .map(|&component| {
                self.get(component, strategy)
                    .map(|procedure| (component, procedure))
                    .ok_or_else(|| {
                        ExError::new(ExErrorKind::UnknownStrategy)
                            .with_op("plan_components")
                            .with_component(component.as_str())
                            .with_message(format!(
                                "no {} procedure registered for {}",
                                strategy, component
                            ))
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_covers_every_pair() {
        let registry = ComponentRegistry::standard();
        for strategy in [Strategy::Rsync, Strategy::Tarball] {
            let plan = registry.plan(strategy).unwrap();
            let order: Vec<Component> = plan.iter().map(|(c, _)| *c).collect();
            assert_eq!(order, Component::ORDER.to_vec());
        }
    }

    #[test]
    fn test_plan_reports_missing_procedure() {
        let mut registry = ComponentRegistry::new();
        registry.register(
            Component::Repositories,
            Strategy::Rsync,
            Box::new(RsyncRepositories),
        );

        let err = registry.plan(Strategy::Rsync).err().unwrap();
        assert_eq!(err.kind(), ExErrorKind::UnknownStrategy);
        assert_eq!(err.component(), Some("pages"));
    }
}
