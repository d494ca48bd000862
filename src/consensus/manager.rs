//! Consensus Manager
//!
//! A per-node state machine that keeps one versioned format rule consistent
//! across the cluster: leader election with randomized timeouts, term and log
//! bookkeeping, and single-writer commit of new rule versions.
//!
//! ## Responsibilities
//! - **Election**: A background timer turns a quiet follower into a candidate;
//!   a candidate becomes leader only after counting real vote grants from a
//!   strict majority of the configured cluster.
//! - **Heartbeats**: The leader runs a second background task that resets
//!   follower election timers and carries the latest committed entry so
//!   stale replicas converge.
//! - **Commit**: A proposal is acknowledged to the caller only after a
//!   majority has stored the entry; commits are announced on a watch channel
//!   so blocked readers can wake up.
//!
//! All state transitions funnel through one `RwLock` per node. The lock is
//! never held across a transport call.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{RwLock, watch};

use crate::error::ClusterError;

use super::protocol::{
    AppendEntriesRequest, AppendEntriesResponse, ForwardProposeRequest, ForwardProposeResponse,
    VoteRequest, VoteResponse,
};
use super::transport::RaftTransport;
use super::types::{LogEntry, NodeId, RaftRole, RaftState, RuleVersion};

/// Timer configuration for the consensus protocol.
///
/// The heartbeat interval must stay below the minimum election timeout or
/// healthy leaders trigger spurious elections.
#[derive(Debug, Clone)]
pub struct ConsensusTimings {
    pub election_timeout_min: Duration,
    pub election_timeout_max: Duration,
    pub heartbeat_interval: Duration,
    /// Upper bound for a single peer RPC during elections and replication.
    pub rpc_timeout: Duration,
}

impl Default for ConsensusTimings {
    fn default() -> Self {
        Self {
            election_timeout_min: Duration::from_millis(150),
            election_timeout_max: Duration::from_millis(300),
            heartbeat_interval: Duration::from_millis(75),
            rpc_timeout: Duration::from_millis(500),
        }
    }
}

/// The per-node consensus manager for the replicated format rule.
pub struct FormatConsensus<T: RaftTransport> {
    node_id: NodeId,
    /// All other members of the cluster. Fixed for the lifetime of a run.
    peers: Vec<NodeId>,
    /// Configured cluster size (peers + self); majorities are counted
    /// against this, never against however many peers happen to answer.
    cluster_size: usize,
    state: RwLock<RaftState>,
    transport: T,
    timings: ConsensusTimings,
    running: AtomicBool,
    /// Announces the committed rule version to waiting readers.
    commit_tx: watch::Sender<u64>,
    commit_rx: watch::Receiver<u64>,
    /// Dedup ledger for forwarded proposals (op_id -> committed version),
    /// so a retried forward does not commit twice.
    processed_ops: DashMap<String, u64>,
}

impl<T: RaftTransport> FormatConsensus<T> {
    pub fn new(node_id: NodeId, peers: Vec<NodeId>, transport: T) -> Arc<Self> {
        Self::with_timings(node_id, peers, transport, ConsensusTimings::default())
    }

    pub fn with_timings(
        node_id: NodeId,
        peers: Vec<NodeId>,
        transport: T,
        timings: ConsensusTimings,
    ) -> Arc<Self> {
        let cluster_size = peers.len() + 1;
        let (commit_tx, commit_rx) = watch::channel(0);

        Arc::new(Self {
            node_id,
            peers,
            cluster_size,
            state: RwLock::new(RaftState::new()),
            transport,
            timings,
            running: AtomicBool::new(false),
            commit_tx,
            commit_rx,
            processed_ops: DashMap::new(),
        })
    }

    /// Spawns the election timer loop and returns immediately.
    pub async fn start(self: Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::info!(
            "Starting consensus manager for node {} (cluster size {})",
            self.node_id,
            self.cluster_size
        );

        let manager = self.clone();
        tokio::spawn(async move {
            manager.election_timer_loop().await;
        });
    }

    /// Stops the background loops. In-flight RPC handling keeps working so
    /// a stopped node can still answer peers during shutdown.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Stopped consensus manager for node {}", self.node_id);
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Votes needed to win an election: a strict majority of the configured
    /// cluster, self included.
    pub fn majority(&self) -> usize {
        self.cluster_size / 2 + 1
    }

    pub async fn role(&self) -> RaftRole {
        self.state.read().await.role
    }

    pub async fn current_term(&self) -> u64 {
        self.state.read().await.current_term
    }

    pub async fn leader_hint(&self) -> Option<NodeId> {
        self.state.read().await.known_leader
    }

    /// Always returns the local committed rule; no consensus round is
    /// performed on read. A reader on a lagging follower can observe an
    /// older version than the cluster's newest commit.
    pub async fn current_rule(&self) -> RuleVersion {
        self.state.read().await.committed_rule.clone()
    }

    /// A receiver that tracks the locally committed rule version.
    pub fn subscribe_commits(&self) -> watch::Receiver<u64> {
        self.commit_rx.clone()
    }

    // --- Election ---

    /// Background loop: sleep a randomized interval, then campaign if no
    /// leader has been heard from (and no vote granted) in the meantime.
    async fn election_timer_loop(self: Arc<Self>) {
        while self.running.load(Ordering::SeqCst) {
            let timeout = self.random_election_timeout();
            tokio::time::sleep(timeout).await;

            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            let should_campaign = {
                let state = self.state.read().await;
                state.role != RaftRole::Leader && state.last_leader_contact.elapsed() >= timeout
            };

            if should_campaign {
                self.start_election().await;
            }
        }
    }

    fn random_election_timeout(&self) -> Duration {
        let min = self.timings.election_timeout_min.as_millis() as u64;
        let max = self.timings.election_timeout_max.as_millis() as u64;
        let jitter = if max > min {
            rand::random::<u64>() % (max - min)
        } else {
            0
        };
        Duration::from_millis(min + jitter)
    }

    /// Runs one election round: become candidate, request votes from every
    /// peer, and take leadership only on a counted majority of grants.
    pub async fn start_election(self: &Arc<Self>) {
        let (term, request) = {
            let mut state = self.state.write().await;
            if state.role == RaftRole::Leader {
                return;
            }
            state.role = RaftRole::Candidate;
            state.current_term += 1;
            state.voted_for = Some(self.node_id);
            state.last_leader_contact = Instant::now();

            let request = VoteRequest {
                candidate_id: self.node_id,
                term: state.current_term,
                last_log_version: state.last_log_version(),
            };
            (state.current_term, request)
        };

        tracing::info!("Node {} campaigning in term {}", self.node_id, term);

        let mut handles = Vec::with_capacity(self.peers.len());
        for &peer in &self.peers {
            let manager = self.clone();
            let request = request.clone();
            handles.push(tokio::spawn(async move {
                tokio::time::timeout(
                    manager.timings.rpc_timeout,
                    manager.transport.request_vote(peer, request),
                )
                .await
            }));
        }

        // Self-vote plus whatever real acknowledgements arrive.
        let mut votes = 1usize;
        let mut highest_term = term;

        for handle in handles {
            if let Ok(Ok(Ok(response))) = handle.await {
                if response.term > highest_term {
                    highest_term = response.term;
                }
                if response.granted {
                    votes += 1;
                }
            }
        }

        if highest_term > term {
            tracing::info!(
                "Node {} observed term {} during election, standing down",
                self.node_id,
                highest_term
            );
            self.step_down(highest_term).await;
            return;
        }

        let mut won = false;
        let mut commit_to_announce = None;
        {
            let mut state = self.state.write().await;
            // Another message may have changed our world while votes were in
            // flight; only claim leadership for the exact term we campaigned in.
            if state.role == RaftRole::Candidate && state.current_term == term {
                if votes >= self.majority() {
                    state.role = RaftRole::Leader;
                    state.known_leader = Some(self.node_id);
                    // Everything already in our log was stored by a majority
                    // before this election could be won; commit it.
                    let newest = state.last_log_version();
                    commit_to_announce = Self::commit_up_to(&mut state, newest);
                    won = true;
                } else {
                    state.role = RaftRole::Follower;
                }
            }
        }

        if won {
            tracing::info!(
                "Node {} elected leader for term {} with {}/{} votes",
                self.node_id,
                term,
                votes,
                self.cluster_size
            );
            if let Some(version) = commit_to_announce {
                self.commit_tx.send_replace(version);
            }
            self.clone().spawn_heartbeat_loop(term);
        } else {
            tracing::debug!(
                "Node {} lost election for term {} ({}/{} votes)",
                self.node_id,
                term,
                votes,
                self.cluster_size
            );
        }
    }

    /// Leader-only loop sending empty (or catch-up) AppendEntries to reset
    /// follower election timers. Exits as soon as leadership or the term is
    /// lost.
    fn spawn_heartbeat_loop(self: Arc<Self>, term: u64) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.timings.heartbeat_interval);

            loop {
                interval.tick().await;

                if !self.running.load(Ordering::SeqCst) {
                    break;
                }

                let request = {
                    let state = self.state.read().await;
                    if state.role != RaftRole::Leader || state.current_term != term {
                        break;
                    }
                    // Piggyback the newest committed entry so followers that
                    // missed a replication round converge on the next beat.
                    let entries = state
                        .log
                        .iter()
                        .rev()
                        .find(|e| e.rule.version == state.commit_version)
                        .cloned()
                        .map(|e| vec![e])
                        .unwrap_or_default();

                    AppendEntriesRequest {
                        leader_id: self.node_id,
                        term,
                        entries,
                        leader_commit: state.commit_version,
                    }
                };

                let mut handles = Vec::with_capacity(self.peers.len());
                for &peer in &self.peers {
                    let manager = self.clone();
                    let request = request.clone();
                    handles.push(tokio::spawn(async move {
                        tokio::time::timeout(
                            manager.timings.rpc_timeout,
                            manager.transport.append_entries(peer, request),
                        )
                        .await
                    }));
                }

                for handle in handles {
                    if let Ok(Ok(Ok(response))) = handle.await {
                        if response.term > term {
                            tracing::info!(
                                "Node {} heartbeat rejected by higher term {}, stepping down",
                                self.node_id,
                                response.term
                            );
                            self.step_down(response.term).await;
                            return;
                        }
                    }
                }
            }
        });
    }

    /// Adopts a higher term and falls back to follower.
    async fn step_down(&self, new_term: u64) {
        let mut state = self.state.write().await;
        if new_term > state.current_term {
            state.current_term = new_term;
            state.voted_for = None;
            state.known_leader = None;
        }
        state.role = RaftRole::Follower;
    }

    // --- RPC handlers (invoked by the transport layer) ---

    /// Grants a vote iff the candidate's term is current after adoption, its
    /// log is at least as complete as ours, and we have not already voted
    /// for someone else this term. Idempotent: re-asking for a granted vote
    /// grants it again.
    pub async fn handle_vote_request(&self, request: VoteRequest) -> VoteResponse {
        let mut state = self.state.write().await;

        if request.term > state.current_term {
            state.current_term = request.term;
            state.voted_for = None;
            state.known_leader = None;
            state.role = RaftRole::Follower;
        }

        let log_ok = request.last_log_version >= state.last_log_version();
        let granted = request.term == state.current_term
            && log_ok
            && (state.voted_for.is_none() || state.voted_for == Some(request.candidate_id));

        if granted {
            state.voted_for = Some(request.candidate_id);
            // Granting a vote counts as hearing from a live peer.
            state.last_leader_contact = Instant::now();
            tracing::debug!(
                "Node {} granted vote to {} in term {}",
                self.node_id,
                request.candidate_id,
                state.current_term
            );
        }

        VoteResponse {
            term: state.current_term,
            granted,
        }
    }

    /// Applies a heartbeat or replication request from a leader.
    ///
    /// Entries whose stored checksum does not match their payload are
    /// rejected wholesale and never applied. Appends are gated on the entry
    /// version, which makes retries harmless.
    pub async fn handle_append_entries(
        &self,
        request: AppendEntriesRequest,
    ) -> AppendEntriesResponse {
        let (response, commit_to_announce) = {
            let mut state = self.state.write().await;

            if request.term < state.current_term {
                tracing::debug!(
                    "Node {} dropping stale append from {} (term {} < {})",
                    self.node_id,
                    request.leader_id,
                    request.term,
                    state.current_term
                );
                return AppendEntriesResponse {
                    term: state.current_term,
                    acknowledged: false,
                };
            }

            if request.term > state.current_term {
                state.current_term = request.term;
                state.voted_for = None;
            }
            if state.role != RaftRole::Follower {
                tracing::info!(
                    "Node {} yielding to leader {} in term {}",
                    self.node_id,
                    request.leader_id,
                    request.term
                );
                state.role = RaftRole::Follower;
            }
            state.known_leader = Some(request.leader_id);
            state.last_leader_contact = Instant::now();

            for entry in &request.entries {
                if !entry.rule.checksum_ok() {
                    let computed = crate::checksum::digest(entry.rule.format_str.as_bytes());
                    tracing::error!(
                        "Node {} rejecting entry v{}: checksum mismatch (stored {}, computed {})",
                        self.node_id,
                        entry.rule.version,
                        entry.rule.checksum,
                        computed
                    );
                    return AppendEntriesResponse {
                        term: state.current_term,
                        acknowledged: false,
                    };
                }
            }

            for entry in request.entries {
                let existing = state
                    .log
                    .iter()
                    .position(|e| e.rule.version == entry.rule.version);
                match existing {
                    // An uncommitted local entry conflicting at the same
                    // version (different term or payload) yields to the
                    // leader's entry, along with everything after it.
                    Some(pos) => {
                        if state.log[pos] != entry {
                            state.log.truncate(pos);
                            state.log.push(entry);
                        }
                    }
                    None => {
                        if entry.rule.version > state.last_log_version() {
                            state.log.push(entry);
                        }
                    }
                }
            }

            let commit = if request.leader_commit > state.commit_version {
                Self::commit_up_to(&mut state, request.leader_commit)
            } else {
                None
            };

            (
                AppendEntriesResponse {
                    term: state.current_term,
                    acknowledged: true,
                },
                commit,
            )
        };

        if let Some(version) = commit_to_announce {
            self.commit_tx.send_replace(version);
        }

        response
    }

    /// Advances the committed rule to the newest log entry with
    /// `version <= upto`. Returns the new commit version if it moved.
    fn commit_up_to(state: &mut RaftState, upto: u64) -> Option<u64> {
        let newest = state
            .log
            .iter()
            .filter(|e| e.rule.version <= upto && e.rule.version > state.commit_version)
            .max_by_key(|e| e.rule.version)
            .cloned()?;

        state.commit_version = newest.rule.version;
        state.last_applied = newest.rule.version;
        state.committed_rule = newest.rule;
        Some(state.commit_version)
    }

    // --- Proposals ---

    /// Proposes a new format rule. Succeeds only if this node is the leader
    /// and a majority of the cluster acknowledges storing the entry.
    pub async fn propose(self: &Arc<Self>, format_str: String) -> Result<RuleVersion, ClusterError> {
        let (term, entry, leader_commit) = {
            let mut state = self.state.write().await;
            if state.role != RaftRole::Leader {
                return Err(ClusterError::NotLeader {
                    leader_hint: state.known_leader,
                });
            }

            // Base on the newest log version so a retried proposal after a
            // failed replication round never reuses a version number.
            let base = state.commit_version.max(state.last_log_version());
            let rule = RuleVersion::next(base, format_str);
            let entry = LogEntry {
                term: state.current_term,
                rule,
            };
            state.log.push(entry.clone());
            (state.current_term, entry, state.commit_version)
        };

        tracing::debug!(
            "Node {} replicating rule v{} in term {}",
            self.node_id,
            entry.rule.version,
            term
        );

        let request = AppendEntriesRequest {
            leader_id: self.node_id,
            term,
            entries: vec![entry.clone()],
            leader_commit,
        };

        let mut handles = Vec::with_capacity(self.peers.len());
        for &peer in &self.peers {
            let manager = self.clone();
            let request = request.clone();
            handles.push(tokio::spawn(async move {
                tokio::time::timeout(
                    manager.timings.rpc_timeout,
                    manager.transport.append_entries(peer, request),
                )
                .await
            }));
        }

        // Our own durable append counts toward the majority.
        let mut acks = 1usize;
        let mut highest_term = term;

        for handle in handles {
            if let Ok(Ok(Ok(response))) = handle.await {
                if response.term > highest_term {
                    highest_term = response.term;
                }
                if response.acknowledged {
                    acks += 1;
                }
            }
        }

        if highest_term > term {
            self.step_down(highest_term).await;
            return Err(ClusterError::NotLeader { leader_hint: None });
        }

        let needed = self.majority();
        if acks < needed {
            tracing::warn!(
                "Node {} could not replicate rule v{}: {}/{} acknowledgements",
                self.node_id,
                entry.rule.version,
                acks,
                needed
            );
            return Err(ClusterError::ReplicationTimeout { acks, needed });
        }

        let committed = {
            let mut state = self.state.write().await;
            if state.role != RaftRole::Leader || state.current_term != term {
                return Err(ClusterError::NotLeader {
                    leader_hint: state.known_leader,
                });
            }
            state.commit_version = entry.rule.version;
            state.last_applied = entry.rule.version;
            state.committed_rule = entry.rule.clone();
            state.committed_rule.clone()
        };

        self.commit_tx.send_replace(committed.version);
        tracing::info!(
            "Node {} committed rule v{} (term {}, {}/{} acks)",
            self.node_id,
            committed.version,
            term,
            acks,
            self.cluster_size
        );

        Ok(committed)
    }

    /// Proposes from any node: tries locally, and on `NotLeader` forwards to
    /// the last known leader, retrying with backoff across leadership
    /// changes. `op_id` makes retried forwards idempotent on the leader.
    pub async fn propose_or_forward(
        self: &Arc<Self>,
        op_id: &str,
        format_str: &str,
    ) -> Result<RuleVersion, ClusterError> {
        const ATTEMPTS: usize = 5;
        let mut delay_ms = 100u64;

        for attempt in 0..ATTEMPTS {
            match self.propose(format_str.to_string()).await {
                Ok(rule) => return Ok(rule),
                Err(ClusterError::NotLeader {
                    leader_hint: Some(leader),
                }) if leader != self.node_id => {
                    let forward = ForwardProposeRequest {
                        op_id: op_id.to_string(),
                        format_str: format_str.to_string(),
                    };
                    match self.transport.forward_propose(leader, forward).await {
                        Ok(response) => {
                            if let Some(rule) = response.rule {
                                return Ok(rule);
                            }
                            // Leadership moved while we forwarded; adopt the
                            // receiver's hint and go again.
                            if let Some(hint) = response.leader_hint {
                                let mut state = self.state.write().await;
                                state.known_leader = Some(hint);
                            }
                        }
                        Err(e) => {
                            tracing::warn!(
                                "Node {} failed to forward proposal to {}: {}",
                                self.node_id,
                                leader,
                                e
                            );
                        }
                    }
                }
                Err(ClusterError::NotLeader { .. }) => {
                    // No leader known yet; wait out the election.
                    tracing::debug!(
                        "Node {} has no leader hint (attempt {}), retrying",
                        self.node_id,
                        attempt + 1
                    );
                }
                Err(e) => return Err(e),
            }

            let jitter = rand::random::<u64>() % 50;
            tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
            delay_ms = (delay_ms * 2).min(1200);
        }

        Err(ClusterError::NotLeader {
            leader_hint: self.leader_hint().await,
        })
    }

    /// Handles a proposal forwarded from another node. Deduplicates retried
    /// forwards through the op ledger before going through a full
    /// replication round.
    pub async fn handle_forward_propose(
        self: &Arc<Self>,
        request: ForwardProposeRequest,
    ) -> ForwardProposeResponse {
        if self.processed_ops.contains_key(&request.op_id) {
            tracing::debug!(
                "Node {} already processed forwarded op {}",
                self.node_id,
                request.op_id
            );
            return ForwardProposeResponse {
                rule: Some(self.current_rule().await),
                leader_hint: None,
                error: None,
            };
        }

        match self.propose(request.format_str).await {
            Ok(rule) => {
                if self.processed_ops.len() > 10_000 {
                    self.processed_ops.clear();
                }
                self.processed_ops.insert(request.op_id, rule.version);
                ForwardProposeResponse {
                    rule: Some(rule),
                    leader_hint: None,
                    error: None,
                }
            }
            Err(ClusterError::NotLeader { leader_hint }) => ForwardProposeResponse {
                rule: None,
                leader_hint,
                error: Some("not leader".to_string()),
            },
            Err(e) => ForwardProposeResponse {
                rule: None,
                leader_hint: None,
                error: Some(e.to_string()),
            },
        }
    }
}
