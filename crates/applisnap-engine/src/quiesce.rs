//! GC quiescing.
//!
//! Before repository data is copied, the appliance's compaction scheduler is
//! told to stand down by creating a sentinel file, and the controller waits
//! for running `git gc`/`repack` processes to finish. The sentinel is removed
//! by `QuiesceGuard`, explicitly or on drop, so every exit path of the
//! repository transfer releases it.
//!
//! ```text
//! Idle -> Quiescing -> Quiesced -> Released
//!   \_____________________________/
//! ```

#![allow(clippy::result_large_err)]

use crate::remote::RemoteChannel;
use applisnap_core::clock::Clock;
use applisnap_core::config::Config;
use applisnap_core::errors::{ExError, ExErrorKind, Result};
use applisnap_core::poll::{CancellationFlag, PollOutcome, Poller};
use applisnap_core::{log_op_end, log_op_error, log_op_start};
use std::time::{Duration, Instant};

/// Lists every process's full command line
pub const PROCESS_LIST_COMMAND: &str = "ps axo args";

/// git subcommands that rewrite or delete objects
const COMPACTION_COMMANDS: [&str; 5] = ["nw-repack", "repack", "gc", "pack-objects", "prune"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuiesceState {
    Idle,
    Quiescing,
    Quiesced,
    Released,
}

/// Whether a `ps` line is a git compaction process
///
/// Matches `git [options] <cmd>`, skipping global options and the values of
/// `-c`/`-C`.
pub fn is_compaction_process(args: &str) -> bool {
    let mut tokens = args.split_whitespace();
    let is_git = tokens
        .next()
        .map(|program| program.rsplit('/').next() == Some("git"))
        .unwrap_or(false);
    if !is_git {
        return false;
    }

    while let Some(token) = tokens.next() {
        if token == "-c" || token == "-C" {
            tokens.next();
            continue;
        }
        if token.starts_with('-') {
            continue;
        }
        return COMPACTION_COMMANDS.contains(&token);
    }
    false
}

/// Holds the sentinel; releasing it lets compaction resume
pub struct QuiesceGuard<'a> {
    channel: &'a dyn RemoteChannel,
    sentinel: String,
    state: QuiesceState,
}

impl std::fmt::Debug for QuiesceGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuiesceGuard")
            .field("sentinel", &self.sentinel)
            .field("state", &self.state)
            .finish()
    }
}

impl<'a> QuiesceGuard<'a> {
    fn new(channel: &'a dyn RemoteChannel, sentinel: String) -> Self {
        Self {
            channel,
            sentinel,
            state: QuiesceState::Idle,
        }
    }

    pub fn state(&self) -> QuiesceState {
        self.state
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Remove the sentinel
    ///
    /// A guard that never entered `Quiescing` has nothing to remove. Calling
    /// this more than once is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::RemoteCommand` or `ExErrorKind::Connectivity`
    /// if the remove command fails. The guard is `Released` either way.
    pub fn release(&mut self) -> Result<()> {
        let previous = std::mem::replace(&mut self.state, QuiesceState::Released);
        match previous {
            QuiesceState::Idle | QuiesceState::Released => Ok(()),
            QuiesceState::Quiescing | QuiesceState::Quiesced => {
                let command = format!("sudo rm -f '{}'", self.sentinel);
                self.channel.exec_ok("release_gc_sentinel", &command)?;
                tracing::info!(sentinel = %self.sentinel, "released gc sentinel");
                Ok(())
            }
        }
    }
}

impl Drop for QuiesceGuard<'_> {
    fn drop(&mut self) {
        if self.state == QuiesceState::Released {
            return;
        }
        if let Err(e) = self.release() {
            tracing::error!(
                sentinel = %self.sentinel,
                error = %e,
                "failed to remove gc sentinel; remove it by hand to let compaction resume"
            );
        }
    }
}

/// Suspends remote compaction for the duration of a repository transfer
pub struct GcQuiescer<'a> {
    channel: &'a dyn RemoteChannel,
    sentinel: String,
    interval: Duration,
    cooldown: Duration,
    clock: &'a dyn Clock,
    cancel: &'a CancellationFlag,
}

impl<'a> GcQuiescer<'a> {
    pub fn new(
        config: &Config,
        channel: &'a dyn RemoteChannel,
        clock: &'a dyn Clock,
        cancel: &'a CancellationFlag,
    ) -> Self {
        Self {
            channel,
            sentinel: config.remote.gc_sentinel(),
            interval: config.gc.poll_interval(),
            cooldown: config.gc.cooldown(),
            clock,
            cancel,
        }
    }

    /// Create the sentinel and wait for compaction to stop
    ///
    /// On error the sentinel has already been released.
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::QuiesceTimeout` when compaction is still running
    /// after the cooldown, `ExErrorKind::Cancelled` on interrupt, or the
    /// remote command's error.
    pub fn quiesce(&self) -> Result<QuiesceGuard<'a>> {
        let start = Instant::now();
        log_op_start!("quiesce_gc", sentinel = %self.sentinel);

        let result = self.enter();
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => {
                log_op_end!("quiesce_gc", duration_ms = duration_ms);
            }
            Err(e) => log_op_error!("quiesce_gc", e.clone(), duration_ms = duration_ms),
        }
        result
    }

    fn enter(&self) -> Result<QuiesceGuard<'a>> {
        let mut guard = QuiesceGuard::new(self.channel, self.sentinel.clone());

        // Quiescing before the touch: if the touch half-succeeds the guard
        // still removes the sentinel.
        guard.state = QuiesceState::Quiescing;
        let touch = format!("sudo -u git touch '{}'", self.sentinel);
        self.channel.exec_ok("create_gc_sentinel", &touch)?;

        let poller = Poller::new(
            "quiesce_gc",
            self.interval,
            Some(self.cooldown),
            self.clock,
            self.cancel,
        );
        let outcome = poller.poll(|attempt| {
            let active = self.active_compactions()?;
            if active > 0 {
                tracing::debug!(attempt, active, "compaction still running");
            }
            Ok(active == 0)
        })?;

        match outcome {
            PollOutcome::Ready { attempts } => {
                guard.state = QuiesceState::Quiesced;
                tracing::info!(attempts, "compaction quiesced");
                Ok(guard)
            }
            PollOutcome::Exhausted { attempts } => Err(ExError::new(ExErrorKind::QuiesceTimeout)
                .with_op("quiesce_gc")
                .with_component("repositories")
                .with_message(format!(
                    "compaction still running after {}s ({} polls)",
                    self.cooldown.as_secs(),
                    attempts
                ))),
        }
    }

    fn active_compactions(&self) -> Result<usize> {
        let output = self
            .channel
            .exec_ok("list_processes", PROCESS_LIST_COMMAND)?;
        Ok(output
            .stdout_str()
            .lines()
            .filter(|line| is_compaction_process(line))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{RemoteInput, RemoteOutput, RemoteSink};
    use applisnap_core::config::RemoteHost;
    use std::sync::Mutex;

    #[test]
    fn test_compaction_detection() {
        assert!(is_compaction_process("git gc --auto"));
        assert!(is_compaction_process("/usr/bin/git repack -adf"));
        assert!(is_compaction_process("git -c pack.threads=1 pack-objects --stdout"));
        assert!(is_compaction_process("git -C /data/user/repositories/a/b.git nw-repack"));
        assert!(is_compaction_process("git --git-dir=/x prune --expire now"));

        assert!(!is_compaction_process("git upload-pack /a/b.git"));
        assert!(!is_compaction_process("git -c gc.auto=0 fetch"));
        assert!(!is_compaction_process("gitmon gc"));
        assert!(!is_compaction_process("/bin/sh -c git gc"));
        assert!(!is_compaction_process(""));
    }

    struct RecordingChannel {
        host: RemoteHost,
        commands: Mutex<Vec<String>>,
    }

    impl RemoteChannel for RecordingChannel {
        fn host(&self) -> &RemoteHost {
            &self.host
        }

        fn run(&self, command: &str, _: RemoteInput<'_>, _: RemoteSink<'_>) -> Result<RemoteOutput> {
            self.commands.lock().unwrap().push(command.to_string());
            Ok(RemoteOutput::default())
        }
    }

    fn channel() -> RecordingChannel {
        RecordingChannel {
            host: "ghe.example.com".parse().unwrap(),
            commands: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn test_idle_guard_releases_without_remote_call() {
        let channel = channel();
        {
            let guard = QuiesceGuard::new(&channel, "/x/.sync_in_progress".to_string());
            assert_eq!(guard.state(), QuiesceState::Idle);
        }
        assert!(channel.commands.lock().unwrap().is_empty());
    }

    #[test]
    fn test_release_is_idempotent() {
        let channel = channel();
        let mut guard = QuiesceGuard::new(&channel, "/x/.sync_in_progress".to_string());
        guard.state = QuiesceState::Quiesced;

        guard.release().unwrap();
        guard.release().unwrap();
        drop(guard);

        let commands = channel.commands.lock().unwrap();
        assert_eq!(*commands, vec!["sudo rm -f '/x/.sync_in_progress'".to_string()]);
    }
}
