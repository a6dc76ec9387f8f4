//! Run configuration
//!
//! A `Config` is loaded once per process from a TOML file and then passed by
//! reference into every component. Nothing reads configuration from globals.
//!
//! ```toml
//! hostname = "admin@ghe.example.com:122"
//! data_dir = "/var/backups/applisnap"
//! strategy = "rsync"
//!
//! [gc]
//! cooldown_secs = 60
//!
//! [maintenance]
//! poll_interval_secs = 5
//! ```

use crate::errors::ConfigError;
use crate::model::Strategy;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SSH_USER: &str = "admin";
pub const DEFAULT_SSH_PORT: u16 = 122;

/// Remote connection descriptor: `[user@]host[:port]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHost {
    pub user: String,
    pub host: String,
    pub port: u16,
}

impl RemoteHost {
    /// `user@host`, the ssh destination argument
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// `user@host:path`, an rsync remote path
    pub fn remote_path(&self, path: &str) -> String {
        format!("{}@{}:{}", self.user, self.host, path)
    }
}

impl fmt::Display for RemoteHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

impl FromStr for RemoteHost {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidHost {
            descriptor: s.to_string(),
            reason: reason.to_string(),
        };

        let descriptor = s.trim();
        let (user, rest) = match descriptor.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (user.to_string(), rest),
            Some(_) => return Err(invalid("empty user")),
            None => (DEFAULT_SSH_USER.to_string(), descriptor),
        };
        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| invalid("port is not a number"))?;
                (host, port)
            }
            None => (rest, DEFAULT_SSH_PORT),
        };
        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        if host.contains(|c: char| c.is_whitespace() || c == '/' || c == '@') {
            return Err(invalid("host contains invalid characters"));
        }
        Ok(Self {
            user,
            host: host.to_string(),
            port,
        })
    }
}

/// Remote data locations on the appliance
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemotePaths {
    pub repositories_dir: String,
    pub pages_dir: String,
    pub elasticsearch_dir: String,
    pub release_file: String,
}

impl Default for RemotePaths {
    fn default() -> Self {
        Self {
            repositories_dir: "/data/user/repositories".to_string(),
            pages_dir: "/data/user/pages".to_string(),
            elasticsearch_dir: "/data/user/elasticsearch".to_string(),
            release_file: "/etc/github/enterprise-release".to_string(),
        }
    }
}

impl RemotePaths {
    /// File whose presence tells the remote compaction scheduler to stand down
    pub fn gc_sentinel(&self) -> String {
        format!(
            "{}/.sync_in_progress",
            self.repositories_dir.trim_end_matches('/')
        )
    }
}

/// GC quiescing timing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GcSettings {
    pub poll_interval_secs: u64,
    pub cooldown_secs: u64,
}

impl Default for GcSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 1,
            cooldown_secs: 60,
        }
    }
}

impl GcSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Maintenance-mode drain timing
///
/// `timeout_secs` is unset by default: the drain wait is unbounded unless the
/// operator opts into a bound.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MaintenanceSettings {
    pub poll_interval_secs: u64,
    pub timeout_secs: Option<u64>,
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            timeout_secs: None,
        }
    }
}

impl MaintenanceSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Immutable configuration for one run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Default appliance descriptor, overridden by a HOST argument
    pub hostname: Option<String>,
    /// Local directory holding snapshot directories and `current`
    pub data_dir: PathBuf,
    /// Transfer mechanism for new snapshots
    pub strategy: Strategy,
    /// ssh identity file
    pub identity_file: Option<PathBuf>,
    /// Emit JSON logs instead of human-readable lines
    pub log_json: bool,
    pub remote: RemotePaths,
    pub gc: GcSettings,
    pub maintenance: MaintenanceSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hostname: None,
            data_dir: PathBuf::from("data"),
            strategy: Strategy::default(),
            identity_file: None,
            log_json: false,
            remote: RemotePaths::default(),
            gc: GcSettings::default(),
            maintenance: MaintenanceSettings::default(),
        }
    }
}

impl Config {
    /// Load and validate a config file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` or `ConfigError::Parse` for unreadable or
    /// malformed files, and `ConfigError::InvalidSetting` for out-of-range
    /// values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&text).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    /// Parse and validate TOML text
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make polling spin or never start
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidSetting` naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gc.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "gc.poll_interval_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.gc.cooldown_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "gc.cooldown_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.maintenance.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "maintenance.poll_interval_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidSetting {
                key: "data_dir",
                reason: "must not be empty".to_string(),
            });
        }

        // Remote paths are single-quoted in remote shell commands and the
        // identity file is joined into rsync's whitespace-split `-e` string
        let remote = [
            ("remote.repositories_dir", self.remote.repositories_dir.as_str()),
            ("remote.pages_dir", self.remote.pages_dir.as_str()),
            ("remote.elasticsearch_dir", self.remote.elasticsearch_dir.as_str()),
            ("remote.release_file", self.remote.release_file.as_str()),
        ];
        for (key, path) in remote {
            check_shell_safe(key, path)?;
        }
        if let Some(identity) = &self.identity_file {
            let identity = identity.to_str().ok_or_else(|| ConfigError::InvalidSetting {
                key: "identity_file",
                reason: "must be valid UTF-8".to_string(),
            })?;
            check_shell_safe("identity_file", identity)?;
        }
        Ok(())
    }

    /// Resolve the appliance descriptor, preferring an explicit argument
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingHost` when neither source names a host,
    /// or `ConfigError::InvalidHost` when the descriptor does not parse.
    pub fn resolve_host(&self, explicit: Option<&str>) -> Result<RemoteHost, ConfigError> {
        explicit
            .or(self.hostname.as_deref())
            .ok_or(ConfigError::MissingHost)?
            .parse()
    }
}

/// Reject paths that cannot be embedded verbatim in a shell word
fn check_shell_safe(key: &'static str, path: &str) -> Result<(), ConfigError> {
    if path.is_empty() {
        return Err(ConfigError::InvalidSetting {
            key,
            reason: "must not be empty".to_string(),
        });
    }
    if let Some(c) = path
        .chars()
        .find(|&c| c.is_whitespace() || c.is_control() || matches!(c, '\'' | '"' | '\\'))
    {
        return Err(ConfigError::InvalidSetting {
            key,
            reason: format!("{:?} contains unsupported character {:?}", path, c),
        });
    }
    Ok(())
}
