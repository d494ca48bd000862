//! Rule Synchronizer
//!
//! The cluster-facing wrapper around one node's consensus manager. It
//! validates proposed templates before they are replicated, stamps each
//! update with an operation id so forwarded retries stay idempotent, and
//! lets callers block until the node has observed a given committed version.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::consensus::manager::FormatConsensus;
use crate::consensus::transport::RaftTransport;
use crate::consensus::types::{NodeId, RuleVersion};
use crate::error::ClusterError;
use crate::rules::template::apply_template;

/// Static cluster topology for one node.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub local_id: NodeId,
    /// Every member of the cluster, the local node included.
    pub nodes: Vec<(NodeId, SocketAddr)>,
}

impl ClusterConfig {
    /// Ids of every other member.
    pub fn peer_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .map(|(id, _)| *id)
            .filter(|id| *id != self.local_id)
            .collect()
    }

    pub fn addresses(&self) -> HashMap<NodeId, SocketAddr> {
        self.nodes.iter().cloned().collect()
    }
}

/// Keeps one node's view of the format rule in sync with the cluster.
pub struct RuleSynchronizer<T: RaftTransport> {
    consensus: Arc<FormatConsensus<T>>,
}

impl<T: RaftTransport> RuleSynchronizer<T> {
    pub fn new(consensus: Arc<FormatConsensus<T>>) -> Arc<Self> {
        Arc::new(Self { consensus })
    }

    /// Starts the underlying consensus loops.
    pub async fn start(&self) {
        self.consensus.clone().start().await;
    }

    pub fn stop(&self) {
        self.consensus.stop();
    }

    /// Proposes a new format rule from this node.
    ///
    /// The template is validated locally first; a template the engine cannot
    /// render is rejected without touching the cluster. Non-leader nodes
    /// forward to the leader transparently.
    pub async fn update_rule(&self, format_str: &str) -> Result<RuleVersion, ClusterError> {
        if let Err(e) = apply_template(format_str, &0u64) {
            return Err(ClusterError::InvalidTemplate {
                message: e.to_string(),
            });
        }

        let op_id = Uuid::new_v4().to_string();
        let rule = self.consensus.propose_or_forward(&op_id, format_str).await?;
        tracing::info!(
            "Node {} committed rule version {} ({:?})",
            self.consensus.node_id(),
            rule.version,
            rule.format_str
        );
        Ok(rule)
    }

    /// The newest rule this node has observed as committed.
    pub async fn current_rule(&self) -> RuleVersion {
        self.consensus.current_rule().await
    }

    /// Blocks until this node has observed a committed version of at least
    /// `min_version`, or the timeout elapses.
    ///
    /// Returns immediately when the node is already at or past the version.
    pub async fn wait_for_version(
        &self,
        min_version: u64,
        timeout: Duration,
    ) -> Result<RuleVersion, ClusterError> {
        let mut versions = self.consensus.subscribe_commits();

        // Map away the `watch::Ref` guard (not `Send`) before the next await.
        let waited = tokio::time::timeout(timeout, versions.wait_for(|v| *v >= min_version))
            .await
            .map(|r| r.map(|_| ()));

        match waited {
            Ok(Ok(_)) => Ok(self.consensus.current_rule().await),
            // A closed channel means the node shut down; the caller sees the
            // same outcome as a timeout.
            Ok(Err(_)) | Err(_) => Err(ClusterError::WaitTimeout { min_version }),
        }
    }

    pub fn consensus(&self) -> &Arc<FormatConsensus<T>> {
        &self.consensus
    }
}
