//! Cluster Layers
//!
//! Two replication strategies over the same fixed node topology: a
//! primary–secondary cluster with deterministic failover and a
//! masterless quorum cluster with last-writer-wins versioning. Both
//! operate on nodes through the [`Peer`] capability trait, so the
//! transport stays pluggable.

mod peer;
mod primary;
mod quorum;

pub use peer::{EnginePeer, Peer, RemotePeer};
pub use primary::PrimaryCluster;
pub use quorum::QuorumCluster;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::store::KvEngine;

/// Default topology for a three-node cluster
pub const DEFAULT_NODE_IDS: [&str; 3] = ["n1", "n2", "n3"];

/// A cluster member: a peer plus the cluster's routing state for it
pub struct ClusterNode {
    id: String,
    peer: Arc<dyn Peer>,
    alive: AtomicBool,
}

impl ClusterNode {
    /// Wrap a peer as a cluster member, initially alive
    pub fn new(id: impl Into<String>, peer: Arc<dyn Peer>) -> Self {
        Self {
            id: id.into(),
            peer,
            alive: AtomicBool::new(true),
        }
    }

    /// Node identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The node's peer handle
    pub fn peer(&self) -> &Arc<dyn Peer> {
        &self.peer
    }

    /// Whether the cluster may route requests to this node
    pub fn is_routable(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && self.peer.is_alive()
    }

    fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }
}

/// Open one engine-backed node per id, WAL files named by node id
/// under `dir`
fn open_nodes(dir: &Path, node_ids: &[&str]) -> Result<Vec<ClusterNode>> {
    if node_ids.is_empty() {
        return Err(Error::Config("cluster needs at least one node".into()));
    }
    std::fs::create_dir_all(dir)?;

    node_ids
        .iter()
        .map(|id| {
            let engine = KvEngine::open(dir.join(format!("{id}.log")))?;
            let peer: Arc<dyn Peer> = Arc::new(EnginePeer::new(Arc::new(engine)));
            Ok(ClusterNode::new(*id, peer))
        })
        .collect()
}

/// Flip routing state for `id`; unknown ids are an error
fn set_node_alive(nodes: &[ClusterNode], id: &str, alive: bool) -> Result<()> {
    match nodes.iter().find(|node| node.id() == id) {
        Some(node) => {
            node.set_alive(alive);
            tracing::info!(node = id, alive, "node routing state changed");
            Ok(())
        }
        None => Err(Error::NodeNotFound(id.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_nodes_one_wal_per_id() {
        let dir = tempdir().unwrap();
        let nodes = open_nodes(dir.path(), &DEFAULT_NODE_IDS).unwrap();

        assert_eq!(nodes.len(), 3);
        for id in DEFAULT_NODE_IDS {
            assert!(dir.path().join(format!("{id}.log")).exists());
        }
    }

    #[test]
    fn test_open_nodes_rejects_empty_topology() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            open_nodes(dir.path(), &[]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_mark_unknown_node_fails() {
        let dir = tempdir().unwrap();
        let nodes = open_nodes(dir.path(), &["n1"]).unwrap();

        assert!(matches!(
            set_node_alive(&nodes, "n9", false),
            Err(Error::NodeNotFound(_))
        ));
    }
}
