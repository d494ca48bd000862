//! Error types for the cluster
//!
//! Caller-facing operations (`propose`, `format`, `wait_for_version`) surface
//! one of these variants so callers can branch on kind instead of parsing
//! opaque error strings. Protocol-internal conditions (a stale term seen by a
//! follower) are handled inside the consensus module and never escape it.

use thiserror::Error;

use crate::consensus::types::NodeId;

/// Result type for cluster operations
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Errors that can occur across the consensus and execution layers
#[derive(Debug, Error)]
pub enum ClusterError {
    /// A proposal reached a node that is not the leader.
    /// Recoverable: retry against `leader_hint` if present.
    #[error("not the leader; last known leader: {leader_hint:?}")]
    NotLeader { leader_hint: Option<NodeId> },

    /// An RPC arrived carrying a term the receiver has since surpassed.
    /// Discarded locally, never fatal.
    #[error("stale term {observed} (current term is {current})")]
    StaleTerm { observed: u64, current: u64 },

    /// A proposal could not gather majority acknowledgement in time.
    #[error("replication timed out: {acks}/{needed} acknowledgements")]
    ReplicationTimeout { acks: usize, needed: usize },

    /// A received log entry's stored checksum does not match its payload.
    /// The entry is dropped, never applied.
    #[error("checksum mismatch for version {version}: expected {expected}, computed {computed}")]
    ChecksumMismatch {
        version: u64,
        expected: String,
        computed: String,
    },

    /// A proposed template failed validation and was never replicated.
    #[error("invalid format template: {message}")]
    InvalidTemplate { message: String },

    /// One shard's batch render failed; the whole format call fails.
    #[error("shard {shard_id} failed to render: {message}")]
    ShardRender { shard_id: usize, message: String },

    /// A format call was attempted before any rule was ever committed.
    #[error("no format rule has been committed yet")]
    NoRuleSet,

    /// `wait_for_version` expired before the cluster reached the version.
    #[error("timed out waiting for committed version >= {min_version}")]
    WaitTimeout { min_version: u64 },

    /// Transport-level failure talking to a peer.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClusterError {
    /// Returns true if retrying the operation might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClusterError::NotLeader { .. }
                | ClusterError::ReplicationTimeout { .. }
                | ClusterError::WaitTimeout { .. }
                | ClusterError::Transport(_)
        )
    }

    /// Returns the leader hint if this is a NotLeader error.
    pub fn leader_hint(&self) -> Option<NodeId> {
        if let ClusterError::NotLeader { leader_hint } = self {
            *leader_hint
        } else {
            None
        }
    }
}

impl From<reqwest::Error> for ClusterError {
    fn from(err: reqwest::Error) -> Self {
        ClusterError::Transport(err.to_string())
    }
}
