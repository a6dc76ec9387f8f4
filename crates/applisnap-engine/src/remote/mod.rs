//! Remote Execution Channel
//!
//! Runs a shell command on the appliance and wires local byte streams to its
//! stdin/stdout. The channel never touches the local filesystem except for
//! the files a caller explicitly hands it as stdin source or stdout sink.

#![allow(clippy::result_large_err)]

mod host_check;
mod ssh;

pub use host_check::{check_host, ApplianceVersion, MINIMUM_SUPPORTED};
pub use ssh::SshChannel;

use applisnap_core::config::RemoteHost;
use applisnap_core::errors::{ExError, ExErrorKind, Result};
use std::path::Path;

/// Where the remote command's stdin comes from
#[derive(Debug, Clone, Copy)]
pub enum RemoteInput<'a> {
    None,
    Bytes(&'a [u8]),
    File(&'a Path),
}

/// Where the remote command's stdout goes
#[derive(Debug, Clone, Copy)]
pub enum RemoteSink<'a> {
    /// Collected into `RemoteOutput::stdout`
    Capture,
    /// Streamed into a local file (created or truncated)
    File(&'a Path),
    Discard,
}

/// Result of a remote command that ran
#[derive(Debug, Clone, Default)]
pub struct RemoteOutput {
    pub status: i32,
    /// Empty unless the sink was `RemoteSink::Capture`
    pub stdout: Vec<u8>,
}

impl RemoteOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Command execution on the appliance
pub trait RemoteChannel: Send + Sync {
    /// Connection descriptor this channel talks to
    fn host(&self) -> &RemoteHost;

    /// Run `command` on the remote host
    ///
    /// A nonzero remote exit status is returned in `RemoteOutput::status`,
    /// not as an error; callers decide whether it is fatal.
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::Connectivity` when the channel cannot be
    /// established, or an IO error for the local stdin/stdout files.
    fn run(&self, command: &str, stdin: RemoteInput<'_>, stdout: RemoteSink<'_>)
        -> Result<RemoteOutput>;

    /// Run with no stdin and captured stdout
    ///
    /// # Errors
    ///
    /// See [`RemoteChannel::run`].
    fn exec(&self, command: &str) -> Result<RemoteOutput> {
        self.run(command, RemoteInput::None, RemoteSink::Capture)
    }

    /// Like `exec`, but a nonzero exit status is an error
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::RemoteCommand` carrying the exit status.
    fn exec_ok(&self, op: &str, command: &str) -> Result<RemoteOutput> {
        let output = self.exec(command)?;
        if !output.success() {
            return Err(remote_command_failed(op, command, output.status));
        }
        Ok(output)
    }
}

/// Error for a remote command that exited nonzero
pub fn remote_command_failed(op: &str, command: &str, status: i32) -> ExError {
    ExError::new(ExErrorKind::RemoteCommand)
        .with_op(op.to_string())
        .with_exit_status(status)
        .with_message(format!("remote command `{}` exited with {}", command, status))
}
