//! Appliance reachability and version check
//!
//! Every backup and restore starts here: the release file is read over the
//! channel and the reported version must be at least `MINIMUM_SUPPORTED`.

use super::RemoteChannel;
use applisnap_core::errors::{ExError, ExErrorKind, Result};
use std::fmt;

/// Oldest appliance release this tool knows how to back up
pub const MINIMUM_SUPPORTED: ApplianceVersion = ApplianceVersion {
    major: 2,
    minor: 0,
    patch: 0,
};

const VERSION_KEY: &str = "RELEASE_VERSION";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ApplianceVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ApplianceVersion {
    /// Parse `x.y.z`; a missing patch or minor component reads as 0
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        let patch = match parts.next() {
            // Ignore pre-release suffixes such as `3.1.4-rc1`
            Some(p) => p
                .split(|c: char| !c.is_ascii_digit())
                .next()
                .filter(|d| !d.is_empty())?
                .parse()
                .ok()?,
            None => 0,
        };
        Some(Self {
            major,
            minor,
            patch,
        })
    }

    /// Extract `RELEASE_VERSION="x.y.z"` from a shell-style release file
    pub fn from_release_file(contents: &str) -> Option<Self> {
        contents.lines().find_map(|line| {
            let (key, value) = line.trim().split_once('=')?;
            if key.trim() != VERSION_KEY {
                return None;
            }
            Self::parse(value.trim().trim_matches(|c| c == '"' || c == '\''))
        })
    }
}

impl fmt::Display for ApplianceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Confirm the appliance answers and runs a supported release
///
/// # Errors
///
/// Returns `ExErrorKind::Connectivity` when the channel fails, the release
/// file is unreadable, or the version is older than `MINIMUM_SUPPORTED`.
pub fn check_host(channel: &dyn RemoteChannel, release_file: &str) -> Result<ApplianceVersion> {
    let command = format!("cat '{}'", release_file);
    let output = channel.exec(&command)?;

    let unsupported = |message: String| {
        ExError::new(ExErrorKind::Connectivity)
            .with_op("host_check")
            .with_message(format!("{}: {}", channel.host(), message))
    };

    if !output.success() {
        return Err(unsupported(format!(
            "cannot read {}; is this a supported appliance?",
            release_file
        ))
        .with_exit_status(output.status));
    }

    let version = ApplianceVersion::from_release_file(&output.stdout_str()).ok_or_else(|| {
        unsupported(format!("no {} found in {}", VERSION_KEY, release_file))
    })?;

    if version < MINIMUM_SUPPORTED {
        return Err(unsupported(format!(
            "appliance version {} is not supported (minimum {})",
            version, MINIMUM_SUPPORTED
        )));
    }

    tracing::info!(host = %channel.host(), version = %version, "appliance reachable");
    Ok(version)
}
