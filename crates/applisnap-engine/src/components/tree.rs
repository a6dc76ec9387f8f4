use super::{ComponentContext, ComponentProcedure};
use crate::quiesce::GcQuiescer;
use crate::repositories::RepositoryTransfer;
use crate::transfer::{RuleSet, TransferRequest};
use applisnap_core::config::RemotePaths;
use applisnap_core::errors::Result;

/// Remote directory a tree procedure mirrors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteDir {
    Repositories,
    Pages,
    SearchIndex,
}

impl RemoteDir {
    pub fn path(self, paths: &RemotePaths) -> &str {
        match self {
            RemoteDir::Repositories => &paths.repositories_dir,
            RemoteDir::Pages => &paths.pages_dir,
            RemoteDir::SearchIndex => &paths.elasticsearch_dir,
        }
    }
}

/// A remote directory mirrored into `<snapshot>/<local>/` with rsync,
/// linking unchanged files against the previous snapshot
#[derive(Debug, Clone)]
pub struct RsyncTree {
    remote: RemoteDir,
    local: &'static str,
    remote_user: &'static str,
}

impl RsyncTree {
    pub fn new(remote: RemoteDir, local: &'static str, remote_user: &'static str) -> Self {
        Self {
            remote,
            local,
            remote_user,
        }
    }
}

impl ComponentProcedure for RsyncTree {
    fn backup(&self, ctx: &ComponentContext<'_>) -> Result<()> {
        let remote_dir = self.remote.path(&ctx.config.remote);

        // Appliances without the feature have no directory at all
        let probe = ctx.channel.exec(&format!("test -d '{}'", remote_dir))?;
        if !probe.success() {
            tracing::info!(dir = remote_dir, "remote directory absent; nothing to back up");
            return Ok(());
        }

        let dest = ctx.snapshot_dir.join(self.local);
        let previous = ctx.previous_dir.map(|p| p.join(self.local));
        let rules = RuleSet::all();
        let request = TransferRequest::pull(self.local, remote_dir, &dest, &rules)
            .with_link_dest(previous.as_deref().filter(|p| p.is_dir()))
            .with_remote_user(self.remote_user);
        ctx.transfer.sync(&request)
    }

    fn restore(&self, ctx: &ComponentContext<'_>) -> Result<()> {
        let src = ctx.snapshot_dir.join(self.local);
        if !src.is_dir() {
            tracing::info!(dir = %src.display(), "not present in snapshot; skipping");
            return Ok(());
        }

        let rules = RuleSet::all();
        let request = TransferRequest::push(
            self.local,
            &src,
            self.remote.path(&ctx.config.remote),
            &rules,
        )
        .with_remote_user(self.remote_user);
        ctx.transfer.sync(&request)
    }
}

/// Repository data: quiesced, five-pass pull; single-pass push
#[derive(Debug, Clone, Copy)]
pub struct RsyncRepositories;

const REPOSITORIES_LOCAL: &str = "repositories";
const REPOSITORIES_USER: &str = "git";

impl ComponentProcedure for RsyncRepositories {
    fn backup(&self, ctx: &ComponentContext<'_>) -> Result<()> {
        let mut guard = GcQuiescer::new(ctx.config, ctx.channel, ctx.clock, ctx.cancel).quiesce()?;

        let dest = ctx.snapshot_dir.join(REPOSITORIES_LOCAL);
        let previous = ctx.previous_dir.map(|p| p.join(REPOSITORIES_LOCAL));
        RepositoryTransfer::new(
            ctx.transfer,
            RemoteDir::Repositories.path(&ctx.config.remote),
            REPOSITORIES_USER,
            ctx.cancel,
        )
        .pull(&dest, previous.as_deref())?;

        guard.release()
    }

    fn restore(&self, ctx: &ComponentContext<'_>) -> Result<()> {
        let src = ctx.snapshot_dir.join(REPOSITORIES_LOCAL);
        let rules = RuleSet::all();
        let request = TransferRequest::push(
            REPOSITORIES_LOCAL,
            &src,
            RemoteDir::Repositories.path(&ctx.config.remote),
            &rules,
        )
        .with_hard_links(true)
        .with_remote_user(REPOSITORIES_USER);
        ctx.transfer.sync(&request)
    }
}
