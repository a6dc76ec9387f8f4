use super::{BulkTransfer, Direction, TransferRequest};
use crate::remote::{RemoteChannel, SshChannel};
use applisnap_core::config::RemoteHost;
use applisnap_core::errors::{ExError, ExErrorKind, Result};
use std::path::Path;
use std::process::{Command, Stdio};

/// rsync exit status for "some source files vanished"; expected on a live
/// appliance and not a failure
const RSYNC_VANISHED: i32 = 24;

/// `BulkTransfer` backed by the system `rsync`
#[derive(Debug, Clone)]
pub struct RsyncTransfer {
    host: RemoteHost,
    shell: String,
    program: String,
    verbose: bool,
}

impl RsyncTransfer {
    /// Reuse the channel's host and ssh options for rsync's transport
    pub fn new(channel: &SshChannel, verbose: bool) -> Self {
        Self {
            host: channel.host().clone(),
            shell: channel.shell_command(),
            program: "rsync".to_string(),
            verbose,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Full argv for `request`
    pub fn args(&self, request: &TransferRequest<'_>) -> Vec<String> {
        let mut args = vec![if self.verbose { "-av" } else { "-a" }.to_string()];
        if request.compress {
            args.push("-z".to_string());
        }
        if request.hard_links {
            args.push("-H".to_string());
        }
        if request.delete {
            args.push("--delete".to_string());
        }
        if let Some(link_dest) = request.link_dest {
            args.push(format!("--link-dest={}", link_dest.display()));
        }
        if let Some(user) = request.remote_user {
            args.push(format!("--rsync-path=sudo -u {} rsync", user));
        }
        args.push("-e".to_string());
        args.push(self.shell.clone());
        args.extend(request.rules.to_rsync_args());

        match request.direction {
            Direction::Pull {
                remote_src,
                local_dest,
            } => {
                args.push(self.host.remote_path(&contents_of(remote_src)));
                args.push(local_dest.display().to_string());
            }
            Direction::Push {
                local_src,
                remote_dest,
            } => {
                args.push(contents_of(&local_src.display().to_string()));
                args.push(self.host.remote_path(remote_dest));
            }
        }
        args
    }
}

/// rsync copies a directory's contents, not the directory, when the
/// source ends in `/`
fn contents_of(dir: &str) -> String {
    if dir.ends_with('/') {
        dir.to_string()
    } else {
        format!("{}/", dir)
    }
}

fn transfer_failed(label: &str, message: String) -> ExError {
    ExError::new(ExErrorKind::Transfer)
        .with_op(format!("transfer_{}", label))
        .with_message(message)
}

impl BulkTransfer for RsyncTransfer {
    fn sync(&self, request: &TransferRequest<'_>) -> Result<()> {
        if let Direction::Pull { local_dest, .. } = request.direction {
            ensure_dir(request.label, local_dest)?;
        }
        let args = self.args(request);
        tracing::debug!(label = request.label, args = ?args, "rsync");

        let status = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .status()
            .map_err(|e| {
                transfer_failed(request.label, format!("cannot start {}: {}", self.program, e))
            })?;

        match status.code() {
            Some(0) => Ok(()),
            Some(RSYNC_VANISHED) => {
                tracing::warn!(label = request.label, "some files vanished during transfer");
                Ok(())
            }
            Some(code) => Err(transfer_failed(
                request.label,
                format!("{} exited with {}", self.program, code),
            )
            .with_exit_status(code)),
            None => Err(transfer_failed(
                request.label,
                format!("{} was terminated by a signal", self.program),
            )),
        }
    }
}

fn ensure_dir(label: &str, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .map_err(|e| transfer_failed(label, format!("cannot create {}: {}", dir.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::RuleSet;
    use std::path::PathBuf;

    fn transfer() -> RsyncTransfer {
        let channel = SshChannel::new("git-admin@ghe.example.com:122".parse().unwrap(), None);
        RsyncTransfer::new(&channel, false)
    }

    #[test]
    fn test_pull_args_order_and_options() {
        let rules = RuleSet::new().include("/*/").include("/*/*.git/packed-refs");
        let dest = PathBuf::from("/backup/20240101T000000/repositories");
        let prev = PathBuf::from("/backup/20231231T000000/repositories");
        let request = TransferRequest::pull("packed-refs", "/data/user/repositories", &dest, &rules)
            .with_link_dest(Some(&prev))
            .with_remote_user("git");

        let args = transfer().args(&request);

        assert_eq!(args[0], "-a");
        assert_eq!(args[1], "-z");
        assert!(args.contains(&"--link-dest=/backup/20231231T000000/repositories".to_string()));
        assert!(args.contains(&"--rsync-path=sudo -u git rsync".to_string()));
        let e = args.iter().position(|a| a == "-e").unwrap();
        assert!(args[e + 1].starts_with("ssh -p 122"));
        assert_eq!(args[args.len() - 3], "--exclude=*");
        assert_eq!(
            args[args.len() - 2],
            "git-admin@ghe.example.com:/data/user/repositories/"
        );
        assert_eq!(args[args.len() - 1], "/backup/20240101T000000/repositories");
    }

    #[test]
    fn test_link_dest_absolute_for_relative_data_dir() {
        let store = applisnap_store::SnapshotStore::open("data").unwrap();
        let previous = applisnap_core::model::SnapshotId::parse("20240101T000000").unwrap();
        let current = applisnap_core::model::SnapshotId::parse("20240102T000000").unwrap();
        let dest = store.path_of(&current).join("repositories");
        let prev = store.path_of(&previous).join("repositories");
        let rules = RuleSet::all();
        let request = TransferRequest::pull("objects", "/data/user/repositories", &dest, &rules)
            .with_link_dest(Some(&prev));

        let args = transfer().args(&request);

        let link_dest = args
            .iter()
            .find_map(|a| a.strip_prefix("--link-dest="))
            .unwrap();
        assert!(Path::new(link_dest).is_absolute(), "{link_dest}");
        assert!(link_dest.ends_with("data/20240101T000000/repositories"));
        assert!(Path::new(args.last().unwrap()).is_absolute());
    }

    #[test]
    fn test_objects_style_request_disables_compression() {
        let rules = RuleSet::all();
        let dest = PathBuf::from("/tmp/dest");
        let request = TransferRequest::pull("objects", "/data/user/repositories/", &dest, &rules)
            .with_compression(false)
            .with_hard_links(true);

        let args = transfer().args(&request);

        assert!(!args.contains(&"-z".to_string()));
        assert!(args.contains(&"-H".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--exclude")));
    }

    #[test]
    fn test_push_sends_directory_contents() {
        let rules = RuleSet::all();
        let src = PathBuf::from("/backup/current/pages");
        let request = TransferRequest::push("pages", &src, "/data/user/pages", &rules);

        let args = transfer().args(&request);

        assert_eq!(args[args.len() - 2], "/backup/current/pages/");
        assert_eq!(
            args[args.len() - 1],
            "git-admin@ghe.example.com:/data/user/pages"
        );
    }

    #[test]
    fn test_failed_rsync_reports_exit_status() {
        let dir = tempfile::TempDir::new().unwrap();
        let rules = RuleSet::all();
        let dest = dir.path().join("out");
        let request = TransferRequest::pull("pages", "/data/user/pages", &dest, &rules);

        let err = transfer()
            .with_program("false")
            .sync(&request)
            .unwrap_err();

        assert_eq!(err.kind(), ExErrorKind::Transfer);
        assert_eq!(err.op(), Some("transfer_pages"));
        assert_eq!(err.exit_status(), Some(1));
        assert!(dest.is_dir());
    }
}
