#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use applisnap_core::clock::ManualClock;
use applisnap_core::config::Config;
use applisnap_core::errors::{io_error, ExError, ExErrorKind, Result};
use applisnap_core::model::Strategy;
use applisnap_core::poll::CancellationFlag;
use applisnap_core::RemoteHost;
use applisnap_engine::maintenance::STATUS_COMMAND;
use applisnap_engine::quiesce::PROCESS_LIST_COMMAND;
use applisnap_engine::transfer::Direction;
use applisnap_engine::{
    BackupOrchestrator, BackupReport, BulkTransfer, ComponentRegistry, RemoteChannel,
    RemoteInput, RemoteOutput, RemoteSink, RestoreOrchestrator, RestoreReport, RunContext,
    TransferRequest,
};
use chrono::{TimeZone, Utc};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

pub const APPLIANCE_VERSION: &str = "3.10.2";

// ========== Scripted remote channel ==========

/// Remote channel that records every command and answers from a script
pub struct StubChannel {
    host: RemoteHost,
    commands: Mutex<Vec<String>>,
    release_version: Mutex<String>,
    gc_active_polls: Mutex<u32>,
    maintenance_active: Mutex<VecDeque<u64>>,
    maintenance_raw: Mutex<Option<String>>,
    failures: Mutex<Vec<(String, i32)>>,
    cancel_on: Mutex<Option<(String, CancellationFlag)>>,
    imports: Mutex<Vec<(String, Vec<u8>)>>,
}

impl StubChannel {
    pub fn new() -> Self {
        Self {
            host: "admin@ghe.example.com:122".parse().unwrap(),
            commands: Mutex::new(Vec::new()),
            release_version: Mutex::new(APPLIANCE_VERSION.to_string()),
            gc_active_polls: Mutex::new(0),
            maintenance_active: Mutex::new(VecDeque::new()),
            maintenance_raw: Mutex::new(None),
            failures: Mutex::new(Vec::new()),
            cancel_on: Mutex::new(None),
            imports: Mutex::new(Vec::new()),
        }
    }

    /// Report `version` from the release file
    pub fn set_release_version(&self, version: &str) {
        *self.release_version.lock().unwrap() = version.to_string();
    }

    /// The next `polls` process listings show a running `git gc`
    pub fn set_gc_active_polls(&self, polls: u32) {
        *self.gc_active_polls.lock().unwrap() = polls;
    }

    /// Active operation counts for successive status calls; 0 once drained
    pub fn set_maintenance_active(&self, counts: &[u64]) {
        *self.maintenance_active.lock().unwrap() = counts.iter().copied().collect();
    }

    /// Replace the status command's output verbatim
    pub fn set_maintenance_raw(&self, raw: &str) {
        *self.maintenance_raw.lock().unwrap() = Some(raw.to_string());
    }

    /// Commands containing `needle` exit with `status`
    pub fn fail_on(&self, needle: &str, status: i32) {
        self.failures
            .lock()
            .unwrap()
            .push((needle.to_string(), status));
    }

    /// Set `flag` as soon as a command containing `needle` runs
    pub fn cancel_on(&self, needle: &str, flag: &CancellationFlag) {
        *self.cancel_on.lock().unwrap() = Some((needle.to_string(), flag.clone()));
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn clear_commands(&self) {
        self.commands.lock().unwrap().clear();
    }

    pub fn count(&self, needle: &str) -> usize {
        self.commands()
            .iter()
            .filter(|c| c.contains(needle))
            .count()
    }

    pub fn position(&self, needle: &str) -> Option<usize> {
        self.commands().iter().position(|c| c.contains(needle))
    }

    /// Bytes fed to each import command, in order
    pub fn imports(&self) -> Vec<(String, Vec<u8>)> {
        self.imports.lock().unwrap().clone()
    }

    fn answer(&self, command: &str) -> Vec<u8> {
        if command.starts_with("cat ") {
            let version = self.release_version.lock().unwrap().clone();
            return format!("RELEASE_PLATFORM=\"esx\"\nRELEASE_VERSION=\"{}\"\n", version)
                .into_bytes();
        }
        if command == PROCESS_LIST_COMMAND {
            let mut remaining = self.gc_active_polls.lock().unwrap();
            let mut listing = String::from("ARGS\n/usr/sbin/sshd -D\ngit upload-pack /a/b.git\n");
            if *remaining > 0 {
                *remaining -= 1;
                listing.push_str("git gc --auto --quiet\n");
            }
            return listing.into_bytes();
        }
        if command == STATUS_COMMAND {
            if let Some(raw) = self.maintenance_raw.lock().unwrap().clone() {
                return raw.into_bytes();
            }
            let active = self
                .maintenance_active
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(0);
            return format!(
                r#"{{"status":"scheduled","connection_services":[{{"name":"git operations","number":{}}},{{"name":"mysql connections","number":0}}]}}"#,
                active
            )
            .into_bytes();
        }
        Vec::new()
    }
}

impl RemoteChannel for StubChannel {
    fn host(&self) -> &RemoteHost {
        &self.host
    }

    fn run(&self, command: &str, stdin: RemoteInput<'_>, stdout: RemoteSink<'_>) -> Result<RemoteOutput> {
        self.commands.lock().unwrap().push(command.to_string());

        if let Some((needle, flag)) = self.cancel_on.lock().unwrap().as_ref() {
            if command.contains(needle.as_str()) {
                flag.cancel();
            }
        }

        let failure = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| command.contains(needle.as_str()))
            .map(|(_, status)| *status);
        if let Some(status) = failure {
            return Ok(RemoteOutput {
                status,
                stdout: Vec::new(),
            });
        }

        if let RemoteInput::File(path) = stdin {
            let bytes = fs::read(path).map_err(|e| io_error("open_remote_stdin", e))?;
            self.imports
                .lock()
                .unwrap()
                .push((command.to_string(), bytes));
        }

        let body = self.answer(command);
        match stdout {
            RemoteSink::Capture => Ok(RemoteOutput {
                status: 0,
                stdout: body,
            }),
            RemoteSink::File(path) => {
                fs::write(path, format!("export of `{}`\n", command))
                    .map_err(|e| io_error("create_remote_stdout", e))?;
                Ok(RemoteOutput::default())
            }
            RemoteSink::Discard => Ok(RemoteOutput::default()),
        }
    }
}

// ========== Local hard-linking transfer ==========

#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub label: String,
    pub pull: bool,
    pub link_dest: Option<PathBuf>,
    pub compress: bool,
    pub hard_links: bool,
    /// Files copied or linked, relative to the transfer root
    pub files: Vec<String>,
}

/// `BulkTransfer` over the local filesystem
///
/// Remote paths resolve under `remote_root`. Files are filtered with
/// `RuleSet::admits`; unchanged files are hard-linked from `link_dest`.
pub struct LocalTransfer {
    remote_root: PathBuf,
    records: Mutex<Vec<TransferRecord>>,
    fail_label: Mutex<Option<String>>,
}

impl LocalTransfer {
    pub fn new(remote_root: PathBuf) -> Self {
        Self {
            remote_root,
            records: Mutex::new(Vec::new()),
            fail_label: Mutex::new(None),
        }
    }

    /// Syncs with this label fail with rsync's partial-transfer status
    pub fn fail_label(&self, label: &str) {
        *self.fail_label.lock().unwrap() = Some(label.to_string());
    }

    pub fn records(&self) -> Vec<TransferRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.label).collect()
    }

    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
    }

    pub fn remote(&self, path: &str) -> PathBuf {
        self.remote_root.join(path.trim_start_matches('/'))
    }

    fn failed(label: &str, message: String) -> ExError {
        ExError::new(ExErrorKind::Transfer)
            .with_op(format!("transfer_{}", label))
            .with_exit_status(23)
            .with_message(message)
    }
}

fn walk(root: &Path, rel: &str, out: &mut Vec<(String, bool)>) {
    let dir = if rel.is_empty() {
        root.to_path_buf()
    } else {
        root.join(rel)
    };
    let mut entries: Vec<_> = fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap())
        .collect();
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = if rel.is_empty() {
            name
        } else {
            format!("{}/{}", rel, name)
        };
        let is_dir = entry.file_type().unwrap().is_dir();
        out.push((path.clone(), is_dir));
        if is_dir {
            walk(root, &path, out);
        }
    }
}

impl BulkTransfer for LocalTransfer {
    fn sync(&self, request: &TransferRequest<'_>) -> Result<()> {
        let (src, dest, pull) = match request.direction {
            Direction::Pull {
                remote_src,
                local_dest,
            } => (self.remote(remote_src), local_dest.to_path_buf(), true),
            Direction::Push {
                local_src,
                remote_dest,
            } => (local_src.to_path_buf(), self.remote(remote_dest), false),
        };

        let mut record = TransferRecord {
            label: request.label.to_string(),
            pull,
            link_dest: request.link_dest.map(Path::to_path_buf),
            compress: request.compress,
            hard_links: request.hard_links,
            files: Vec::new(),
        };

        if self.fail_label.lock().unwrap().as_deref() == Some(request.label) {
            self.records.lock().unwrap().push(record);
            return Err(Self::failed(request.label, "injected failure".to_string()));
        }
        if !src.is_dir() {
            self.records.lock().unwrap().push(record);
            return Err(Self::failed(
                request.label,
                format!("source {} does not exist", src.display()),
            ));
        }

        fs::create_dir_all(&dest).unwrap();
        let mut entries = Vec::new();
        walk(&src, "", &mut entries);

        for (rel, is_dir) in entries {
            if !request.rules.admits(&rel, is_dir) {
                continue;
            }
            let target = dest.join(&rel);
            if is_dir {
                fs::create_dir_all(&target).unwrap();
                continue;
            }
            fs::create_dir_all(target.parent().unwrap()).unwrap();
            if target.exists() {
                fs::remove_file(&target).unwrap();
            }

            let source = src.join(&rel);
            let linked = request
                .link_dest
                .map(|base| base.join(&rel))
                .filter(|prev| prev.is_file() && fs::read(prev).unwrap() == fs::read(&source).unwrap());
            match linked {
                Some(prev) => fs::hard_link(prev, &target).unwrap(),
                None => {
                    fs::copy(&source, &target).unwrap();
                }
            }
            record.files.push(rel);
        }

        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

// ========== Harness ==========

/// A fake appliance filesystem, a local data dir and every collaborator a
/// run needs
pub struct Harness {
    pub dir: TempDir,
    pub config: Config,
    pub channel: StubChannel,
    pub transfer: LocalTransfer,
    pub registry: ComponentRegistry,
    pub clock: ManualClock,
    pub cancel: CancellationFlag,
}

impl Harness {
    pub fn new(strategy: Strategy) -> Self {
        let dir = TempDir::new().unwrap();
        let remote_root = dir.path().join("appliance");

        let config = Config {
            hostname: Some("admin@ghe.example.com:122".to_string()),
            data_dir: dir.path().join("backup"),
            strategy,
            ..Config::default()
        };

        let harness = Self {
            transfer: LocalTransfer::new(remote_root),
            dir,
            config,
            channel: StubChannel::new(),
            registry: ComponentRegistry::standard(),
            clock: ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap()),
            cancel: CancellationFlag::new(),
        };
        harness.seed_appliance();
        harness
    }

    fn seed_appliance(&self) {
        let files = [
            ("data/user/repositories/github/linguist.git/config", "[core]\n"),
            ("data/user/repositories/github/linguist.git/hooks/pre-receive", "#!/bin/sh\n"),
            ("data/user/repositories/github/linguist.git/packed-refs", "abc refs/heads/main\n"),
            ("data/user/repositories/github/linguist.git/refs/heads/topic", "def\n"),
            ("data/user/repositories/github/linguist.git/logs/HEAD", "0 abc\n"),
            ("data/user/repositories/github/linguist.git/objects/pack/pack-1.pack", "PACK-linguist"),
            ("data/user/repositories/github/linguist.git/objects/pack/pack-1.idx", "IDX-linguist"),
            ("data/user/repositories/github/linguist.git/objects/tmp_obj_a1", "partial"),
            ("data/user/repositories/octo/cat.git/packed-refs", "123 refs/heads/main\n"),
            ("data/user/repositories/octo/cat.git/objects/ab/cdef01", "loose"),
            ("data/user/repositories/ab/12/34/56/gist/f00.git/packed-refs", "456 refs/heads/main\n"),
            ("data/user/repositories/__purgatory__/old.git/config", "[core]\n"),
            ("data/user/repositories/__gitmon__/state", "cache"),
            ("data/user/repositories/info/nw-layout", "v2\n"),
            ("data/user/repositories/info/lost+found/orphan", "x"),
            ("data/user/pages/site/index.html", "<html></html>"),
            ("data/user/elasticsearch/nodes/0/segments", "es"),
        ];
        for (path, body) in files {
            self.write_remote(path, body);
        }
    }

    pub fn write_remote(&self, path: &str, body: &str) {
        let full = self.transfer.remote(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, body).unwrap();
    }

    pub fn remote(&self, path: &str) -> PathBuf {
        self.transfer.remote(path)
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn ctx(&self) -> RunContext<'_> {
        RunContext {
            config: &self.config,
            channel: &self.channel,
            transfer: &self.transfer,
            registry: &self.registry,
            clock: &self.clock,
            cancel: &self.cancel,
        }
    }

    pub fn backup(&self) -> Result<BackupReport> {
        BackupOrchestrator::new(self.ctx()).run()
    }

    pub fn restore(&self, reference: &str) -> Result<RestoreReport> {
        RestoreOrchestrator::new(self.ctx()).run(reference)
    }

    /// Move the clock so the next backup gets a fresh snapshot id
    pub fn next_hour(&self) {
        self.clock.advance(std::time::Duration::from_secs(3600));
    }

    pub fn current_target(&self) -> Option<String> {
        fs::read_link(self.data_dir().join("current"))
            .ok()
            .map(|p| p.to_string_lossy().into_owned())
    }
}
