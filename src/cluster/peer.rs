//! Cluster Peers
//!
//! The capability surface a cluster layer needs from a node: versioned
//! mutations, a versioned read, and liveness. Two implementations:
//! [`EnginePeer`] calls straight into an in-process engine (the shipped
//! transport), [`RemotePeer`] speaks the wire protocol to another
//! process.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::network::KvClient;
use crate::store::{KvEngine, WriteOptions};
use crate::wal::Version;

/// A replication target for the cluster layers
pub trait Peer: Send + Sync {
    /// Apply a set, honoring the per-key last-writer-wins rule when a
    /// version is present
    fn apply_set(&self, key: &str, value: &str, version: Option<Version>) -> Result<()>;

    /// Apply a delete, returning whether the key existed
    fn apply_delete(&self, key: &str, version: Option<Version>) -> Result<bool>;

    /// Apply an atomic bulk set
    fn apply_bulk_set(&self, items: &[(String, String)], version: Option<Version>) -> Result<()>;

    /// Current value and last-writer version; absent keys read as no
    /// value at version 0
    fn fetch(&self, key: &str) -> Result<(Option<String>, Version)>;

    /// Whether the peer is reachable right now
    fn is_alive(&self) -> bool;
}

/// In-process peer: synchronous calls into a shared [`KvEngine`]
pub struct EnginePeer {
    engine: Arc<KvEngine>,
}

impl EnginePeer {
    /// Wrap an engine as a peer
    pub fn new(engine: Arc<KvEngine>) -> Self {
        Self { engine }
    }

    /// The wrapped engine (inspection hook for tests and tooling)
    pub fn engine(&self) -> &Arc<KvEngine> {
        &self.engine
    }
}

impl Peer for EnginePeer {
    fn apply_set(&self, key: &str, value: &str, version: Option<Version>) -> Result<()> {
        self.engine
            .set_with(key, value, WriteOptions::versioned(version))
    }

    fn apply_delete(&self, key: &str, version: Option<Version>) -> Result<bool> {
        self.engine.delete_with(key, version)
    }

    fn apply_bulk_set(&self, items: &[(String, String)], version: Option<Version>) -> Result<()> {
        self.engine.bulk_set_with(items, version)
    }

    fn fetch(&self, key: &str) -> Result<(Option<String>, Version)> {
        Ok(self.engine.fetch(key))
    }

    fn is_alive(&self) -> bool {
        true
    }
}

/// Peer reached over the wire protocol
///
/// Each call dials the node fresh, so a restarted node is picked up
/// without connection management. A connect or read timeout counts as a
/// peer failure, which the cluster layers treat like any other
/// unacknowledged attempt.
pub struct RemotePeer {
    address: String,
    timeout: Duration,
}

impl RemotePeer {
    /// Address is `host:port` of the node's TCP server
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    fn client(&self) -> Result<KvClient> {
        KvClient::connect(&self.address, self.timeout)
    }
}

impl Peer for RemotePeer {
    fn apply_set(&self, key: &str, value: &str, version: Option<Version>) -> Result<()> {
        self.client()?.set_versioned(key, value, version)
    }

    fn apply_delete(&self, key: &str, version: Option<Version>) -> Result<bool> {
        self.client()?.delete_versioned(key, version)
    }

    fn apply_bulk_set(&self, items: &[(String, String)], version: Option<Version>) -> Result<()> {
        self.client()?.bulk_set_versioned(items, version)
    }

    fn fetch(&self, key: &str) -> Result<(Option<String>, Version)> {
        self.client()?.fetch(key)
    }

    fn is_alive(&self) -> bool {
        self.client().is_ok()
    }
}
