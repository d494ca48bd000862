use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Instant;

use crate::checksum;

/// Logical identifier of a cluster member.
///
/// Node ids are assigned in the cluster configuration at start-up and stay
/// fixed for the lifetime of a run.
pub type NodeId = u64;

/// The three roles of the election state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RaftRole {
    Follower,
    Candidate,
    Leader,
}

/// One immutable version of the replicated format rule.
///
/// This is the unit of replication: a monotonically increasing version
/// number, the opaque template payload, the wall-clock capture time of the
/// commit, and an integrity digest of the payload. Updates never mutate a
/// `RuleVersion` in place; a successful replication round produces a new one
/// that atomically replaces the committed reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleVersion {
    pub version: u64,
    pub format_str: String,
    /// Wall-clock commit time in milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Hex-encoded SHA-256 digest of `format_str`.
    pub checksum: String,
}

impl RuleVersion {
    /// The sentinel rule present before anything has ever been committed.
    pub fn initial() -> Self {
        Self {
            version: 0,
            format_str: String::new(),
            timestamp: 0,
            checksum: checksum::digest(b""),
        }
    }

    /// Builds the successor rule for a payload, stamping time and digest.
    pub fn next(previous_version: u64, format_str: String) -> Self {
        let checksum = checksum::digest(format_str.as_bytes());
        Self {
            version: previous_version + 1,
            format_str,
            timestamp: now_ms(),
            checksum,
        }
    }

    /// True while no rule has ever been committed.
    pub fn is_unset(&self) -> bool {
        self.version == 0
    }

    /// Recomputes the digest and compares it against the stored one.
    pub fn checksum_ok(&self) -> bool {
        checksum::verify(self.format_str.as_bytes(), &self.checksum)
    }
}

/// Equality requires both version and checksum to match, so two different
/// payloads accidentally sharing a version number compare unequal.
impl PartialEq for RuleVersion {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.checksum == other.checksum
    }
}

impl Eq for RuleVersion {}

/// Total ordering by version alone.
impl Ord for RuleVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version.cmp(&other.version)
    }
}

impl PartialOrd for RuleVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One replicated log entry: the rule together with the term it was
/// proposed in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub term: u64,
    pub rule: RuleVersion,
}

/// Per-node consensus state.
///
/// Every field here is guarded by a single lock in `FormatConsensus`; role
/// transitions are the only legal way `voted_for` and `current_term` change,
/// and no two mutations may interleave (a heartbeat-triggered term bump and a
/// timer-triggered candidacy must not race).
#[derive(Debug)]
pub(crate) struct RaftState {
    pub role: RaftRole,
    pub current_term: u64,
    pub voted_for: Option<NodeId>,
    pub log: Vec<LogEntry>,
    /// The rule a majority has durably acknowledged.
    pub committed_rule: RuleVersion,
    /// Highest committed rule version (version-based commit bookkeeping).
    pub commit_version: u64,
    /// Highest rule version applied to `committed_rule`.
    pub last_applied: u64,
    /// Last time a valid heartbeat was observed or a vote was granted.
    /// The election timer only fires when this is older than the timeout.
    pub last_leader_contact: Instant,
    /// Cached hint used to forward proposals arriving on a non-leader.
    pub known_leader: Option<NodeId>,
}

impl RaftState {
    pub fn new() -> Self {
        Self {
            role: RaftRole::Follower,
            current_term: 0,
            voted_for: None,
            log: Vec::new(),
            committed_rule: RuleVersion::initial(),
            commit_version: 0,
            last_applied: 0,
            last_leader_contact: Instant::now(),
            known_leader: None,
        }
    }

    /// Version of the newest log entry, committed or not.
    pub fn last_log_version(&self) -> u64 {
        self.log.last().map(|e| e.rule.version).unwrap_or(0)
    }
}

/// Helper to get the current system time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
