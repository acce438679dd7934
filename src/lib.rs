//! CairnKV - Durable, Cluster-Aware Key-Value Store
//!
//! A crash-safe key-value store built around an append-only write-ahead
//! log, with full-text and embedding search indexes rebuilt from the log
//! at open, and two replication layers over the same node topology.
//!
//! # Architecture
//!
//! - A single-node storage engine appends every mutation to its WAL and
//!   fsyncs before touching in-memory state, so an acknowledged write
//!   survives a hard kill. Bulk writes apply under one lock and are
//!   visible to other threads all-or-nothing.
//! - The primary–secondary cluster routes writes through the first live
//!   node in declaration order and fans them out best-effort to the
//!   rest; failover is a consequence of the selection rule.
//! - The masterless quorum cluster stamps every mutation with a
//!   monotonic version, requires majority acknowledgment, and resolves
//!   conflicts per key by last-writer-wins.
//!
//! # Features
//!
//! - Append-only WAL with fsync-before-ack durability and torn-tail
//!   recovery after a crash
//! - Atomic bulk mutations under concurrent readers
//! - Inverted full-text index and 16-dimension bag-of-words embedding
//!   search
//! - Deterministic failover without an election protocol
//! - Quorum reads/writes with last-writer-wins conflict resolution
//! - Newline-delimited JSON protocol over TCP

pub mod config;
pub mod error;
pub mod wal;
pub mod store;
pub mod cluster;
pub mod protocol;
pub mod network;

pub use config::CairnConfig;
pub use error::{Error, Result};
pub use store::KvEngine;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cluster::{EnginePeer, Peer, PrimaryCluster, QuorumCluster};
    pub use crate::config::CairnConfig;
    pub use crate::error::{Error, Result};
    pub use crate::network::{KvClient, KvServer};
    pub use crate::protocol::{Request, Response};
    pub use crate::store::{KvEngine, WriteOptions};
    pub use crate::wal::{Version, WalRecord};
}
