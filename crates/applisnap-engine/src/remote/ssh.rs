use super::{RemoteChannel, RemoteInput, RemoteOutput, RemoteSink};
use applisnap_core::config::RemoteHost;
use applisnap_core::errors::{io_error, ExError, ExErrorKind, Result};
use std::fs::File;
use std::io::Write;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};

/// ssh reserves this status for its own failures
const SSH_CONNECTION_FAILURE: i32 = 255;

/// `RemoteChannel` backed by the system `ssh` client
#[derive(Debug, Clone)]
pub struct SshChannel {
    host: RemoteHost,
    identity_file: Option<PathBuf>,
    program: String,
}

impl SshChannel {
    pub fn new(host: RemoteHost, identity_file: Option<PathBuf>) -> Self {
        Self {
            host,
            identity_file,
            program: "ssh".to_string(),
        }
    }

    /// Use a different ssh binary (wrapper scripts, tests)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Options shared by every connection: port, batch mode, identity
    pub fn ssh_options(&self) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            self.host.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "ServerAliveInterval=30".to_string(),
        ];
        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args
    }

    /// Full argv for running `command` remotely
    pub fn command_args(&self, command: &str) -> Vec<String> {
        let mut args = self.ssh_options();
        args.push(self.host.destination());
        args.push("--".to_string());
        args.push(command.to_string());
        args
    }

    /// Remote shell command line for `rsync -e`
    pub fn shell_command(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.ssh_options());
        parts.join(" ")
    }

    fn connectivity_error(&self, message: String) -> ExError {
        ExError::new(ExErrorKind::Connectivity)
            .with_op("remote_exec")
            .with_message(format!("{}: {}", self.host, message))
    }

    fn interpret(&self, command: &str, status: ExitStatus) -> Result<i32> {
        match status.code() {
            Some(SSH_CONNECTION_FAILURE) => Err(self
                .connectivity_error(format!("ssh failed while running `{}`", command))
                .with_exit_status(SSH_CONNECTION_FAILURE)),
            Some(code) => Ok(code),
            // Killed by a signal; report it the way a shell would
            None => Ok(128 + status.signal().unwrap_or(0)),
        }
    }
}

impl RemoteChannel for SshChannel {
    fn host(&self) -> &RemoteHost {
        &self.host
    }

    fn run(
        &self,
        command: &str,
        stdin: RemoteInput<'_>,
        stdout: RemoteSink<'_>,
    ) -> Result<RemoteOutput> {
        tracing::debug!(host = %self.host, command, "remote exec");

        let mut cmd = Command::new(&self.program);
        cmd.args(self.command_args(command)).stderr(Stdio::inherit());

        match stdin {
            RemoteInput::None => {
                cmd.stdin(Stdio::null());
            }
            RemoteInput::Bytes(_) => {
                cmd.stdin(Stdio::piped());
            }
            RemoteInput::File(path) => {
                let file = File::open(path).map_err(|e| io_error("open_remote_stdin", e))?;
                cmd.stdin(Stdio::from(file));
            }
        }
        match stdout {
            RemoteSink::Capture => {
                cmd.stdout(Stdio::piped());
            }
            RemoteSink::File(path) => {
                let file = File::create(path).map_err(|e| io_error("create_remote_stdout", e))?;
                cmd.stdout(Stdio::from(file));
            }
            RemoteSink::Discard => {
                cmd.stdout(Stdio::null());
            }
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| self.connectivity_error(format!("cannot start {}: {}", self.program, e)))?;

        // Feed stdin from a separate thread so a large captured stdout
        // cannot deadlock against it.
        let writer = match (stdin, child.stdin.take()) {
            (RemoteInput::Bytes(bytes), Some(mut pipe)) => {
                let bytes = bytes.to_vec();
                Some(std::thread::spawn(move || pipe.write_all(&bytes)))
            }
            _ => None,
        };

        let output = child
            .wait_with_output()
            .map_err(|e| io_error("wait_remote_exec", e))?;

        if let Some(handle) = writer {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => return Err(io_error("write_remote_stdin", e)),
                Err(_) => {
                    return Err(ExError::new(ExErrorKind::Internal)
                        .with_op("write_remote_stdin")
                        .with_message("stdin writer thread panicked"))
                }
            }
        }

        let status = self.interpret(command, output.status)?;
        Ok(RemoteOutput {
            status,
            stdout: output.stdout,
        })
    }
}
