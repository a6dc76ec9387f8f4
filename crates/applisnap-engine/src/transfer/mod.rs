//! Bulk transfer between the appliance and the snapshot directory.
//!
//! A `TransferRequest` describes one rule-filtered sync; a `BulkTransfer`
//! carries it out. Production uses rsync over the remote channel's ssh
//! settings. Delta transfer itself is left entirely to rsync.

#![allow(clippy::result_large_err)]

pub mod rules;
mod rsync;

pub use rsync::RsyncTransfer;
pub use rules::{Rule, RuleSet};

use applisnap_core::errors::Result;
use std::path::Path;

/// Which side is the source
#[derive(Debug, Clone, Copy)]
pub enum Direction<'a> {
    /// Appliance to local snapshot
    Pull {
        remote_src: &'a str,
        local_dest: &'a Path,
    },
    /// Local snapshot to appliance
    Push {
        local_src: &'a Path,
        remote_dest: &'a str,
    },
}

/// One sync: the contents of the source directory into the destination
/// directory, filtered by `rules`.
#[derive(Debug, Clone, Copy)]
pub struct TransferRequest<'a> {
    /// Short name used in logs and errors (`objects`, `pages`, ...)
    pub label: &'a str,
    pub direction: Direction<'a>,
    pub rules: &'a RuleSet,
    /// Previous copy to hard-link unchanged files against
    pub link_dest: Option<&'a Path>,
    pub compress: bool,
    pub hard_links: bool,
    pub delete: bool,
    /// Run the remote side as this user
    pub remote_user: Option<&'a str>,
}

impl<'a> TransferRequest<'a> {
    pub fn pull(label: &'a str, remote_src: &'a str, local_dest: &'a Path, rules: &'a RuleSet) -> Self {
        Self::new(
            label,
            Direction::Pull {
                remote_src,
                local_dest,
            },
            rules,
        )
    }

    pub fn push(label: &'a str, local_src: &'a Path, remote_dest: &'a str, rules: &'a RuleSet) -> Self {
        Self::new(
            label,
            Direction::Push {
                local_src,
                remote_dest,
            },
            rules,
        )
    }

    fn new(label: &'a str, direction: Direction<'a>, rules: &'a RuleSet) -> Self {
        Self {
            label,
            direction,
            rules,
            link_dest: None,
            compress: true,
            hard_links: false,
            delete: false,
            remote_user: None,
        }
    }

    pub fn with_link_dest(mut self, link_dest: Option<&'a Path>) -> Self {
        self.link_dest = link_dest;
        self
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_hard_links(mut self, hard_links: bool) -> Self {
        self.hard_links = hard_links;
        self
    }

    pub fn with_delete(mut self, delete: bool) -> Self {
        self.delete = delete;
        self
    }

    pub fn with_remote_user(mut self, user: &'a str) -> Self {
        self.remote_user = Some(user);
        self
    }
}

/// Executes rule-filtered directory syncs
pub trait BulkTransfer: Send + Sync {
    /// # Errors
    ///
    /// Returns `ExErrorKind::Transfer` carrying the tool's exit status when
    /// the sync fails.
    fn sync(&self, request: &TransferRequest<'_>) -> Result<()>;
}
