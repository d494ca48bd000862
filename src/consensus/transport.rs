//! Peer transport for the consensus protocol.
//!
//! The consensus manager is generic over this trait, so the state machine
//! never knows whether its peers live across a network or in the same
//! process. Two implementations are provided:
//!
//! - [`HttpRaftTransport`]: JSON over HTTP between real nodes, with
//!   retry/backoff on transient failures.
//! - [`LoopbackHub`] / [`LoopbackTransport`]: in-process delivery with
//!   controllable link failures, used for simulated clusters in tests and
//!   single-process demos.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{ClusterError, Result};

use super::manager::FormatConsensus;
use super::protocol::{
    AppendEntriesRequest, AppendEntriesResponse, ENDPOINT_APPEND_ENTRIES,
    ENDPOINT_FORWARD_PROPOSE, ENDPOINT_REQUEST_VOTE, ForwardProposeRequest,
    ForwardProposeResponse, VoteRequest, VoteResponse,
};
use super::types::NodeId;

/// Point-to-point RPC surface between consensus managers.
///
/// Implementations must be idempotent-friendly: the manager retries both
/// RPCs, and the receiving side is written so duplicates are harmless.
pub trait RaftTransport: Send + Sync + 'static {
    fn request_vote(
        &self,
        peer: NodeId,
        request: VoteRequest,
    ) -> impl Future<Output = Result<VoteResponse>> + Send;

    fn append_entries(
        &self,
        peer: NodeId,
        request: AppendEntriesRequest,
    ) -> impl Future<Output = Result<AppendEntriesResponse>> + Send;

    fn forward_propose(
        &self,
        peer: NodeId,
        request: ForwardProposeRequest,
    ) -> impl Future<Output = Result<ForwardProposeResponse>> + Send;
}

// ---------------------------------------------------------------------------
// HTTP transport
// ---------------------------------------------------------------------------

/// Inter-node transport over JSON/HTTP.
pub struct HttpRaftTransport {
    addresses: HashMap<NodeId, SocketAddr>,
    http_client: reqwest::Client,
}

impl HttpRaftTransport {
    pub fn new(addresses: HashMap<NodeId, SocketAddr>) -> Self {
        Self {
            addresses,
            http_client: reqwest::Client::new(),
        }
    }

    fn addr_of(&self, peer: NodeId) -> Result<SocketAddr> {
        self.addresses
            .get(&peer)
            .copied()
            .ok_or_else(|| ClusterError::Transport(format!("unknown peer node {}", peer)))
    }

    async fn post_with_retry<B: serde::Serialize, R: serde::de::DeserializeOwned>(
        &self,
        url: String,
        payload: &B,
        timeout: std::time::Duration,
        attempts: usize,
    ) -> Result<R> {
        let mut delay_ms = 150u64;

        for attempt in 0..attempts {
            let response = self
                .http_client
                .post(url.clone())
                .json(payload)
                .timeout(timeout)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    if !resp.status().is_success() {
                        return Err(ClusterError::Transport(format!(
                            "{} returned {}",
                            url,
                            resp.status()
                        )));
                    }
                    return Ok(resp.json::<R>().await?);
                }
                Err(e) => {
                    if attempt + 1 == attempts {
                        return Err(ClusterError::Transport(e.to_string()));
                    }
                    // Simple jitter to prevent thundering herd
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(ClusterError::Transport("retry attempts exhausted".into()))
    }
}

impl RaftTransport for HttpRaftTransport {
    async fn request_vote(&self, peer: NodeId, request: VoteRequest) -> Result<VoteResponse> {
        let addr = self.addr_of(peer)?;
        self.post_with_retry(
            format!("http://{}{}", addr, ENDPOINT_REQUEST_VOTE),
            &request,
            std::time::Duration::from_millis(300),
            2,
        )
        .await
    }

    async fn append_entries(
        &self,
        peer: NodeId,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        let addr = self.addr_of(peer)?;
        self.post_with_retry(
            format!("http://{}{}", addr, ENDPOINT_APPEND_ENTRIES),
            &request,
            std::time::Duration::from_millis(300),
            2,
        )
        .await
    }

    async fn forward_propose(
        &self,
        peer: NodeId,
        request: ForwardProposeRequest,
    ) -> Result<ForwardProposeResponse> {
        let addr = self.addr_of(peer)?;
        self.post_with_retry(
            format!("http://{}{}", addr, ENDPOINT_FORWARD_PROPOSE),
            &request,
            std::time::Duration::from_millis(1500),
            3,
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Loopback transport (simulated cluster)
// ---------------------------------------------------------------------------

/// An in-process cluster: every node's manager is registered here and RPCs
/// are delivered as direct method calls. Individual links can be cut and
/// healed, which is how the partition scenarios are exercised.
pub struct LoopbackHub {
    nodes: DashMap<NodeId, Arc<FormatConsensus<LoopbackTransport>>>,
    /// Directed blocked links (from, to).
    blocked: DashMap<(NodeId, NodeId), ()>,
}

impl LoopbackHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            nodes: DashMap::new(),
            blocked: DashMap::new(),
        })
    }

    /// Builds the transport handle for one node. Register the node's manager
    /// with [`LoopbackHub::register`] once it is constructed.
    pub fn transport(self: &Arc<Self>, local_id: NodeId) -> LoopbackTransport {
        LoopbackTransport {
            hub: Arc::clone(self),
            local_id,
        }
    }

    pub fn register(&self, node: Arc<FormatConsensus<LoopbackTransport>>) {
        self.nodes.insert(node.node_id(), node);
    }

    /// Cuts both directions between two nodes.
    pub fn partition(&self, a: NodeId, b: NodeId) {
        self.blocked.insert((a, b), ());
        self.blocked.insert((b, a), ());
    }

    /// Cuts every link touching `node`, leaving it alone in its partition.
    pub fn isolate(&self, node: NodeId) {
        for entry in self.nodes.iter() {
            let other = *entry.key();
            if other != node {
                self.partition(node, other);
            }
        }
    }

    pub fn heal(&self, a: NodeId, b: NodeId) {
        self.blocked.remove(&(a, b));
        self.blocked.remove(&(b, a));
    }

    pub fn heal_all(&self) {
        self.blocked.clear();
    }

    fn check_link(&self, from: NodeId, to: NodeId) -> Result<()> {
        if self.blocked.contains_key(&(from, to)) {
            return Err(ClusterError::Transport(format!(
                "link {} -> {} is partitioned",
                from, to
            )));
        }
        Ok(())
    }

    fn node(&self, id: NodeId) -> Result<Arc<FormatConsensus<LoopbackTransport>>> {
        self.nodes
            .get(&id)
            .map(|n| n.value().clone())
            .ok_or_else(|| ClusterError::Transport(format!("node {} is not registered", id)))
    }
}

/// One node's handle onto a [`LoopbackHub`].
#[derive(Clone)]
pub struct LoopbackTransport {
    hub: Arc<LoopbackHub>,
    local_id: NodeId,
}

impl RaftTransport for LoopbackTransport {
    async fn request_vote(&self, peer: NodeId, request: VoteRequest) -> Result<VoteResponse> {
        self.hub.check_link(self.local_id, peer)?;
        let node = self.hub.node(peer)?;
        Ok(node.handle_vote_request(request).await)
    }

    async fn append_entries(
        &self,
        peer: NodeId,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        self.hub.check_link(self.local_id, peer)?;
        let node = self.hub.node(peer)?;
        Ok(node.handle_append_entries(request).await)
    }

    async fn forward_propose(
        &self,
        peer: NodeId,
        request: ForwardProposeRequest,
    ) -> Result<ForwardProposeResponse> {
        self.hub.check_link(self.local_id, peer)?;
        let node = self.hub.node(peer)?;
        Ok(node.handle_forward_propose(request).await)
    }
}
