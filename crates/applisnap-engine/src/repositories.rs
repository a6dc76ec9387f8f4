//! Phased repository transfer.
//!
//! Repository data is pulled in five passes, always in this order:
//!
//! 1. auxiliary metadata (config, hooks, description, ...)
//! 2. `packed-refs`
//! 3. loose refs and reflogs
//! 4. objects and packs
//! 5. the special `__*__` and `info/` directories at the top level
//!
//! Compaction is quiesced for the whole run, so objects copied in pass 4 are
//! a superset of everything the refs copied in passes 2 and 3 point at. A
//! failed pass stops the engine; later passes never run.

#![allow(clippy::result_large_err)]

use crate::transfer::{BulkTransfer, RuleSet, TransferRequest};
use applisnap_core::errors::{cancelled, ExError, ExErrorKind, Result};
use applisnap_core::poll::CancellationFlag;
use applisnap_core::{log_op_end, log_op_error, log_op_start};
use std::path::Path;
use std::time::Instant;

/// Repository roots, relative to the repositories directory: regular
/// repositories and gists
const REPOSITORY_ROOTS: [&str; 2] = ["/*/*.git", "/*/??/??/??/gist/*.git"];

/// Directories leading down to the repository roots
const ROOT_PARENTS: [&str; 5] = [
    "/*/",
    "/*/??/",
    "/*/??/??/",
    "/*/??/??/??/",
    "/*/??/??/??/gist/",
];

/// Top-level subtrees that are caches and never backed up
const CACHE_DIRS: [&str; 4] = [
    "/__nodeload_archives__/",
    "/__gitmon__/",
    "/__render__/",
    "/info/lost+found/",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryPhase {
    Auxiliary,
    PackedRefs,
    Refs,
    Objects,
    SpecialDirs,
}

impl RepositoryPhase {
    pub const ORDER: [RepositoryPhase; 5] = [
        RepositoryPhase::Auxiliary,
        RepositoryPhase::PackedRefs,
        RepositoryPhase::Refs,
        RepositoryPhase::Objects,
        RepositoryPhase::SpecialDirs,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            RepositoryPhase::Auxiliary => "auxiliary",
            RepositoryPhase::PackedRefs => "packed-refs",
            RepositoryPhase::Refs => "refs",
            RepositoryPhase::Objects => "objects",
            RepositoryPhase::SpecialDirs => "special-dirs",
        }
    }

    /// Pack data is already compressed
    pub fn compress(&self) -> bool {
        !matches!(self, RepositoryPhase::Objects)
    }

    /// Alternates share packs through hard links
    pub fn hard_links(&self) -> bool {
        matches!(self, RepositoryPhase::Objects)
    }

    /// Filter for this pass
    pub fn rules(&self) -> RuleSet {
        if *self == RepositoryPhase::SpecialDirs {
            let mut rules = RuleSet::new();
            for dir in CACHE_DIRS {
                rules = rules.exclude(dir);
            }
            return rules
                .include("/__*__/")
                .include("/__*__/**")
                .include("/info/")
                .include("/info/**");
        }

        let mut rules = RuleSet::new().exclude("/__*__/").exclude("/info/");
        for parent in ROOT_PARENTS {
            rules = rules.include(parent);
        }
        for root in REPOSITORY_ROOTS {
            rules = rules.include(format!("{}/", root));
        }
        for root in REPOSITORY_ROOTS {
            rules = match self {
                RepositoryPhase::Auxiliary => rules
                    .exclude(format!("{}/refs/", root))
                    .exclude(format!("{}/packed-refs", root))
                    .exclude(format!("{}/logs/", root))
                    .exclude(format!("{}/objects/", root))
                    .include(format!("{}/**", root)),
                RepositoryPhase::PackedRefs => rules.include(format!("{}/packed-refs", root)),
                RepositoryPhase::Refs => rules
                    .include(format!("{}/refs/", root))
                    .include(format!("{}/refs/**", root))
                    .include(format!("{}/logs/", root))
                    .include(format!("{}/logs/**", root)),
                RepositoryPhase::Objects => rules
                    .exclude(format!("{}/objects/**/tmp_*", root))
                    .include(format!("{}/objects/", root))
                    .include(format!("{}/objects/**", root)),
                RepositoryPhase::SpecialDirs => rules,
            };
        }
        rules
    }
}

/// Runs the five passes into one destination directory
pub struct RepositoryTransfer<'a> {
    transfer: &'a dyn BulkTransfer,
    remote_dir: &'a str,
    remote_user: &'a str,
    cancel: &'a CancellationFlag,
}

impl<'a> RepositoryTransfer<'a> {
    pub fn new(
        transfer: &'a dyn BulkTransfer,
        remote_dir: &'a str,
        remote_user: &'a str,
        cancel: &'a CancellationFlag,
    ) -> Self {
        Self {
            transfer,
            remote_dir,
            remote_user,
            cancel,
        }
    }

    /// Pull every pass into `dest`, linking against `previous` when it exists
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::Transfer` naming the failed pass, or
    /// `ExErrorKind::Cancelled` if interrupted between passes.
    pub fn pull(&self, dest: &Path, previous: Option<&Path>) -> Result<()> {
        for phase in RepositoryPhase::ORDER {
            if self.cancel.is_cancelled() {
                return Err(cancelled("transfer_repositories").with_component("repositories"));
            }
            self.run_phase(phase, dest, previous)?;
        }
        Ok(())
    }

    fn run_phase(&self, phase: RepositoryPhase, dest: &Path, previous: Option<&Path>) -> Result<()> {
        let op = format!("transfer_{}", phase.label());
        let start = Instant::now();
        log_op_start!(op.as_str(), phase = phase.label());

        let rules = phase.rules();
        // Checked per pass: a missing previous copy only costs space.
        let link_dest = previous.filter(|p| p.is_dir());
        let request = TransferRequest::pull(phase.label(), self.remote_dir, dest, &rules)
            .with_link_dest(link_dest)
            .with_compression(phase.compress())
            .with_hard_links(phase.hard_links())
            .with_remote_user(self.remote_user);

        let result = self.transfer.sync(&request).map_err(|e| {
            ExError::new(ExErrorKind::Transfer)
                .with_op(op.clone())
                .with_component("repositories")
                .with_message(format!("repository pass '{}' failed", phase.label()))
                .with_source(e)
        });

        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(()) => {
                log_op_end!(op.as_str(), duration_ms = duration_ms, phase = phase.label());
            }
            Err(e) => log_op_error!(op.as_str(), e.clone(), duration_ms = duration_ms, phase = phase.label()),
        }
        result
    }
}
