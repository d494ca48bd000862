//! HTTP handlers for the internal consensus RPC surface.
//!
//! Mounted by the node binary; peers talk to these through
//! [`HttpRaftTransport`](super::transport::HttpRaftTransport).

use axum::{Extension, Json};
use std::sync::Arc;

use super::manager::FormatConsensus;
use super::protocol::{
    AppendEntriesRequest, AppendEntriesResponse, ForwardProposeRequest, ForwardProposeResponse,
    VoteRequest, VoteResponse,
};
use super::transport::HttpRaftTransport;

pub async fn handle_request_vote(
    Extension(consensus): Extension<Arc<FormatConsensus<HttpRaftTransport>>>,
    Json(request): Json<VoteRequest>,
) -> Json<VoteResponse> {
    Json(consensus.handle_vote_request(request).await)
}

pub async fn handle_append_entries(
    Extension(consensus): Extension<Arc<FormatConsensus<HttpRaftTransport>>>,
    Json(request): Json<AppendEntriesRequest>,
) -> Json<AppendEntriesResponse> {
    Json(consensus.handle_append_entries(request).await)
}

pub async fn handle_forward_propose(
    Extension(consensus): Extension<Arc<FormatConsensus<HttpRaftTransport>>>,
    Json(request): Json<ForwardProposeRequest>,
) -> Json<ForwardProposeResponse> {
    Json(consensus.handle_forward_propose(request).await)
}
