//! Consensus Protocol Definitions
//!
//! Defines the Data Transfer Objects (DTOs) exchanged between consensus
//! managers, plus the HTTP endpoints the default transport mounts them on.
//! Both RPCs are idempotent under retry: votes are granted at most once per
//! term, and appends are version-gated on the receiver.

use serde::{Deserialize, Serialize};

use super::types::{LogEntry, NodeId, RuleVersion};

pub const ENDPOINT_REQUEST_VOTE: &str = "/raft/request_vote";
pub const ENDPOINT_APPEND_ENTRIES: &str = "/raft/append_entries";
pub const ENDPOINT_FORWARD_PROPOSE: &str = "/raft/propose";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRequest {
    pub candidate_id: NodeId,
    pub term: u64,
    /// Newest rule version in the candidate's log. A voter refuses candidates
    /// whose log is behind its own so a committed rule survives failover.
    pub last_log_version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteResponse {
    /// The voter's term after processing the request; a candidate seeing a
    /// higher term here steps down.
    pub term: u64,
    pub granted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    pub leader_id: NodeId,
    pub term: u64,
    /// Empty for pure heartbeats.
    pub entries: Vec<LogEntry>,
    /// Highest rule version the leader has committed. Followers advance
    /// their own commit point up to this.
    pub leader_commit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub term: u64,
    pub acknowledged: bool,
}

/// A proposal forwarded from a non-leader node to the last known leader.
///
/// `op_id` deduplicates retried forwards on the receiving leader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardProposeRequest {
    pub op_id: String,
    pub format_str: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardProposeResponse {
    /// The committed rule on success.
    pub rule: Option<RuleVersion>,
    /// Where to retry if the receiver is itself not the leader.
    pub leader_hint: Option<NodeId>,
    pub error: Option<String>,
}
