//! WAL Record Types
//!
//! Defines the record shapes that are written to the WAL, one serialized
//! object per line, discriminated by an `op` field.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Monotonic write version assigned by a quorum coordinator
pub type Version = u64;

/// A single durable record in the WAL
///
/// The on-disk encoding is one JSON object per LF-terminated line, e.g.
/// `{"op":"set","key":"k","value":"v"}`. The `version` field is present
/// only for writes issued by a quorum coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WalRecord {
    /// Set a single key
    Set {
        key: String,
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<Version>,
    },

    /// Delete a key
    Delete {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<Version>,
    },

    /// Set multiple keys atomically, in listed order
    BulkSet {
        items: Vec<(String, String)>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<Version>,
    },
}

impl WalRecord {
    /// Serialize the record to its single-line form (no trailing newline)
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a record from one log line
    pub fn from_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }

    /// Get the operation name (for logging)
    pub fn op_name(&self) -> &'static str {
        match self {
            WalRecord::Set { .. } => "set",
            WalRecord::Delete { .. } => "delete",
            WalRecord::BulkSet { .. } => "bulk_set",
        }
    }
}
