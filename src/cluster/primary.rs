//! Primary–Secondary Cluster
//!
//! A fixed, ordered set of nodes. The primary is the first routable node
//! in declaration order, re-evaluated at the start of every operation,
//! so failover is a consequence of the selection rule rather than an
//! election. Writes land on the primary synchronously (its WAL fsync
//! must succeed) and fan out best-effort to the remaining routable
//! nodes; reads are served by the primary alone.
//!
//! A freshly promoted secondary can be missing writes that were
//! acknowledged while it lagged; that is the accepted trade-off of the
//! best-effort follower path.

use std::path::Path;

use super::{open_nodes, set_node_alive, ClusterNode, Peer, DEFAULT_NODE_IDS};
use crate::error::{Error, Result};

/// Primary–secondary replication over engine-backed nodes
pub struct PrimaryCluster {
    nodes: Vec<ClusterNode>,
}

impl PrimaryCluster {
    /// Open a cluster under `dir`, one WAL per node id
    pub fn open(dir: impl AsRef<Path>, node_ids: &[&str]) -> Result<Self> {
        Ok(Self {
            nodes: open_nodes(dir.as_ref(), node_ids)?,
        })
    }

    /// Three-node cluster with the default topology
    pub fn open_default(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open(dir, &DEFAULT_NODE_IDS)
    }

    /// Build a cluster over preconstructed nodes (custom peers)
    pub fn from_nodes(nodes: Vec<ClusterNode>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(Error::Config("cluster needs at least one node".into()));
        }
        Ok(Self { nodes })
    }

    /// Id of the node that would coordinate the next operation
    pub fn primary_id(&self) -> Result<String> {
        Ok(self.primary()?.id().to_string())
    }

    /// Stop routing to `id`
    pub fn mark_down(&self, id: &str) -> Result<()> {
        set_node_alive(&self.nodes, id, false)
    }

    /// Resume routing to `id`
    pub fn mark_up(&self, id: &str) -> Result<()> {
        set_node_alive(&self.nodes, id, true)
    }

    /// Write a key through the primary, then replicate best-effort
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let primary = self.primary()?;
        primary.peer().apply_set(key, value, None)?;
        self.replicate(primary.id(), |peer| peer.apply_set(key, value, None));
        Ok(())
    }

    /// Read a key from the current primary
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let (value, _) = self.primary()?.peer().fetch(key)?;
        Ok(value)
    }

    /// Delete a key through the primary, then replicate best-effort
    pub fn delete(&self, key: &str) -> Result<bool> {
        let primary = self.primary()?;
        let existed = primary.peer().apply_delete(key, None)?;
        self.replicate(primary.id(), |peer| {
            peer.apply_delete(key, None).map(|_| ())
        });
        Ok(existed)
    }

    /// Atomic bulk write through the primary, then replicate best-effort
    pub fn bulk_set(&self, items: &[(String, String)]) -> Result<()> {
        let primary = self.primary()?;
        primary.peer().apply_bulk_set(items, None)?;
        self.replicate(primary.id(), |peer| peer.apply_bulk_set(items, None));
        Ok(())
    }

    /// The cluster's members, in declaration order
    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    /// First routable node in declaration order
    fn primary(&self) -> Result<&ClusterNode> {
        self.nodes
            .iter()
            .find(|node| node.is_routable())
            .ok_or(Error::NoQuorum {
                reached: 0,
                required: 1,
            })
    }

    /// Best-effort fan-out to every routable node except the primary.
    /// Individual secondary failures are logged, never surfaced.
    fn replicate<F>(&self, primary_id: &str, op: F)
    where
        F: Fn(&dyn Peer) -> Result<()>,
    {
        for node in &self.nodes {
            if node.id() == primary_id || !node.is_routable() {
                continue;
            }
            if let Err(e) = op(node.peer().as_ref()) {
                tracing::warn!(node = node.id(), error = %e, "secondary replication failed");
            }
        }
    }
}
