//! Wire Protocol
//!
//! Request/response frames exchanged between a client and a node. Each
//! frame is one JSON object on one LF-terminated line; a connection
//! carries any number of request/response pairs in sequence.

use serde::{Deserialize, Serialize};

use crate::wal::Version;

/// Client request, discriminated by the `op` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Set a key
    Set {
        key: String,
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<Version>,
    },

    /// Read a key
    Get { key: String },

    /// Delete a key
    Delete {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<Version>,
    },

    /// Set multiple keys atomically
    BulkSet {
        items: Vec<(String, String)>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<Version>,
    },

    /// Keys whose value contains every query token
    SearchFullText { query: String },

    /// Top-k keys by embedding similarity
    SearchEmbedding {
        query: String,
        #[serde(default = "default_top_k")]
        top_k: i64,
    },
}

fn default_top_k() -> i64 {
    5
}

impl Request {
    /// Get the operation name (for logging)
    pub fn op_name(&self) -> &'static str {
        match self {
            Request::Set { .. } => "set",
            Request::Get { .. } => "get",
            Request::Delete { .. } => "delete",
            Request::BulkSet { .. } => "bulk_set",
            Request::SearchFullText { .. } => "search_full_text",
            Request::SearchEmbedding { .. } => "search_embedding",
        }
    }
}

/// Server response. Exactly one per request; `ok` is false iff `error`
/// is present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,

    /// Value on get (absent key omits the field)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Last-writer version on get, when the key carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,

    /// Whether the key existed, on delete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existed: Option<bool>,

    /// Matching keys, on full-text search
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,

    /// Scored keys, on embedding search
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<(String, f64)>>,

    /// Failure description, on error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    /// Bare acknowledgment
    pub fn success() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    /// Get result; version 0 means the key carries no version and the
    /// field is omitted
    pub fn with_value(value: Option<String>, version: Version) -> Self {
        Self {
            ok: true,
            value,
            version: (version > 0).then_some(version),
            ..Self::default()
        }
    }

    /// Delete result
    pub fn with_existed(existed: bool) -> Self {
        Self {
            ok: true,
            existed: Some(existed),
            ..Self::default()
        }
    }

    /// Full-text search result
    pub fn with_keys(keys: Vec<String>) -> Self {
        Self {
            ok: true,
            keys: Some(keys),
            ..Self::default()
        }
    }

    /// Embedding search result
    pub fn with_results(results: Vec<(String, f64)>) -> Self {
        Self {
            ok: true,
            results: Some(results),
            ..Self::default()
        }
    }

    /// Failure
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
            ..Self::default()
        }
    }
}
