//! Masterless Quorum Cluster
//!
//! All nodes are equal. Every mutation is stamped with a version from
//! the coordinator's monotonic clock and dispatched to all routable
//! nodes concurrently; the write succeeds once a majority acknowledges.
//! Reads consult a majority and return the highest-versioned value.
//! Per-key last-writer-wins at each node makes the write path idempotent
//! under retries and tolerant of reordered arrivals, so a failed write
//! that reached some nodes needs no rollback.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{open_nodes, set_node_alive, ClusterNode, Peer, DEFAULT_NODE_IDS};
use crate::error::{Error, Result};
use crate::wal::Version;

/// Masterless quorum replication over engine-backed nodes
pub struct QuorumCluster {
    nodes: Vec<ClusterNode>,
    /// Version clock; incremented strictly before each mutation
    clock: AtomicU64,
}

impl QuorumCluster {
    /// Open a cluster under `dir`, one WAL per node id
    pub fn open(dir: impl AsRef<Path>, node_ids: &[&str]) -> Result<Self> {
        Ok(Self {
            nodes: open_nodes(dir.as_ref(), node_ids)?,
            clock: AtomicU64::new(0),
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
        Ok(Self {
            nodes,
            clock: AtomicU64::new(0),
        })
    }

    /// Majority size for the full topology
    pub fn quorum_size(&self) -> usize {
        self.nodes.len() / 2 + 1
    }

    /// Stop routing to `id`
    pub fn mark_down(&self, id: &str) -> Result<()> {
        set_node_alive(&self.nodes, id, false)
    }

    /// Resume routing to `id`
    pub fn mark_up(&self, id: &str) -> Result<()> {
        set_node_alive(&self.nodes, id, true)
    }

    /// Versioned write to all routable nodes; succeeds on majority ack
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let alive = self.require_quorum()?;
        let version = self.next_version();
        let acks = self.dispatch(&alive, |peer| peer.apply_set(key, value, Some(version)));
        self.quorum_ack(acks.len())
    }

    /// Quorum read: highest-versioned value among a majority of replies
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let alive = self.require_quorum()?;
        let required = self.quorum_size();

        let mut responses = self.dispatch(&alive, |peer| peer.fetch(key));
        if responses.len() < required {
            return Err(Error::NoQuorum {
                reached: responses.len(),
                required,
            });
        }

        // Any quorum of replies intersects every acknowledged write, so
        // the newest version is guaranteed to be present among the
        // first Q responses.
        responses.truncate(required);
        let newest = responses
            .into_iter()
            .max_by_key(|(_, version)| *version)
            .and_then(|(value, _)| value);
        Ok(newest)
    }

    /// Versioned delete; reports whether any acknowledging node held the
    /// key
    pub fn delete(&self, key: &str) -> Result<bool> {
        let alive = self.require_quorum()?;
        let version = self.next_version();
        let acks = self.dispatch(&alive, |peer| peer.apply_delete(key, Some(version)));
        self.quorum_ack(acks.len())?;
        Ok(acks.into_iter().any(|existed| existed))
    }

    /// Atomic bulk write carrying one version for the whole batch
    pub fn bulk_set(&self, items: &[(String, String)]) -> Result<()> {
        let alive = self.require_quorum()?;
        let version = self.next_version();
        let acks = self.dispatch(&alive, |peer| peer.apply_bulk_set(items, Some(version)));
        self.quorum_ack(acks.len())
    }

    /// The cluster's members, in declaration order
    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    /// Version assigned to the most recent mutation
    pub fn current_version(&self) -> Version {
        self.clock.load(Ordering::SeqCst)
    }

    fn next_version(&self) -> Version {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn require_quorum(&self) -> Result<Vec<&ClusterNode>> {
        let alive: Vec<&ClusterNode> = self
            .nodes
            .iter()
            .filter(|node| node.is_routable())
            .collect();
        let required = self.quorum_size();
        if alive.len() < required {
            return Err(Error::NoQuorum {
                reached: alive.len(),
                required,
            });
        }
        Ok(alive)
    }

    fn quorum_ack(&self, reached: usize) -> Result<()> {
        let required = self.quorum_size();
        if reached >= required {
            Ok(())
        } else {
            Err(Error::NoQuorum { reached, required })
        }
    }

    /// Run `op` against every node concurrently, collecting successful
    /// outcomes. Failed peers are logged and simply missing from the
    /// result, which is how they fall short of quorum.
    fn dispatch<T, F>(&self, nodes: &[&ClusterNode], op: F) -> Vec<T>
    where
        T: Send,
        F: Fn(&dyn Peer) -> Result<T> + Sync,
    {
        let mut outcomes = Vec::with_capacity(nodes.len());
        std::thread::scope(|scope| {
            let handles: Vec<_> = nodes
                .iter()
                .map(|node| {
                    let op = &op;
                    scope.spawn(move || (node.id().to_string(), op(node.peer().as_ref())))
                })
                .collect();

            for handle in handles {
                match handle.join() {
                    Ok((_, Ok(outcome))) => outcomes.push(outcome),
                    Ok((id, Err(e))) => {
                        tracing::warn!(node = %id, error = %e, "peer call failed");
                    }
                    Err(_) => tracing::warn!("peer call panicked"),
                }
            }
        });
        outcomes
    }
}
