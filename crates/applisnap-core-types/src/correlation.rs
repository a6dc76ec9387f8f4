//! Correlation types for run tracking
//!
//! A backup or restore run emits many events across several crates. The
//! `RunId` is attached to the run's root span so they can be grouped.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a single backup, restore or maintenance run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// Generate a new RunId using UUIDv7 (time-ordered)
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Create from an existing string (for deserialization)
    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
