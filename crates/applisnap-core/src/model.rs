//! Domain model: snapshot ids, datasets and transfer strategies

use crate::errors::{ExError, ExErrorKind};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamp layout of snapshot ids. Lexical order equals time order.
pub const SNAPSHOT_ID_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Identifier of one snapshot directory, derived from its UTC start time
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Id for a run starting at `at`
    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        Self(at.format(SNAPSHOT_ID_FORMAT).to_string())
    }

    /// Parse an id, rejecting anything that is not a snapshot timestamp
    ///
    /// This also keeps path separators and `..` out of snapshot paths.
    pub fn parse(s: &str) -> Option<Self> {
        NaiveDateTime::parse_from_str(s, SNAPSHOT_ID_FORMAT)
            .ok()
            .map(|_| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transfer mechanism recorded in a snapshot's `strategy` marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Incremental rsync with hard-link reuse against the previous snapshot
    #[default]
    Rsync,
    /// Full archive streamed from the appliance's export commands
    Tarball,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Rsync => "rsync",
            Strategy::Tarball => "tarball",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = ExError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "rsync" => Ok(Strategy::Rsync),
            "tarball" => Ok(Strategy::Tarball),
            other => Err(ExError::new(ExErrorKind::UnknownStrategy)
                .with_op("read_strategy")
                .with_message(format!("unrecognized strategy marker '{}'", other))),
        }
    }
}

/// One backed-up dataset of the appliance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    Repositories,
    Pages,
    Database,
    CacheStore,
    Credentials,
    SearchIndex,
    HostIdentity,
}

impl Component {
    /// Backup and restore order
    pub const ORDER: [Component; 7] = [
        Component::Repositories,
        Component::Pages,
        Component::Database,
        Component::CacheStore,
        Component::Credentials,
        Component::SearchIndex,
        Component::HostIdentity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Repositories => "repositories",
            Component::Pages => "pages",
            Component::Database => "mysql",
            Component::CacheStore => "redis",
            Component::Credentials => "authorized-keys",
            Component::SearchIndex => "elasticsearch",
            Component::HostIdentity => "ssh-host-keys",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
