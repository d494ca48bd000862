//! Consensus Module Tests
//!
//! This module contains unit and integration tests for leader election,
//! replication, and failover, run against in-process loopback clusters.
//!
//! ## Test Scopes
//! - **Election**: Leader emergence, vote accounting, one leader per term.
//! - **Replication**: Majority-gated commits, checksum rejection, idempotent appends.
//! - **Failover**: Partitioned leaders, re-election, log convergence after healing.

#[cfg(test)]
mod tests {
    use crate::consensus::manager::FormatConsensus;
    use crate::consensus::protocol::{
        AppendEntriesRequest, ForwardProposeRequest, VoteRequest,
    };
    use crate::consensus::transport::{LoopbackHub, LoopbackTransport};
    use crate::consensus::types::{LogEntry, NodeId, RaftRole, RuleVersion};
    use crate::error::ClusterError;
    use std::sync::Arc;
    use std::time::Duration;

    type Node = Arc<FormatConsensus<LoopbackTransport>>;

    async fn spawn_cluster(size: u64) -> (Arc<LoopbackHub>, Vec<Node>) {
        let hub = LoopbackHub::new();
        let mut nodes = Vec::new();

        for id in 1..=size {
            let peers: Vec<NodeId> = (1..=size).filter(|p| *p != id).collect();
            let node = FormatConsensus::new(id, peers, hub.transport(id));
            hub.register(node.clone());
            nodes.push(node);
        }

        for node in &nodes {
            node.clone().start().await;
        }

        (hub, nodes)
    }

    async fn wait_for_leader(nodes: &[Node]) -> Node {
        for _ in 0..100 {
            for node in nodes {
                if node.role().await == RaftRole::Leader {
                    return node.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("no leader elected within the allotted time");
    }

    async fn wait_for_leader_among(nodes: &[Node], exclude: NodeId) -> Node {
        for _ in 0..100 {
            for node in nodes {
                if node.node_id() != exclude && node.role().await == RaftRole::Leader {
                    return node.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("no replacement leader elected within the allotted time");
    }

    async fn wait_for_rule(node: &Node, version: u64) -> RuleVersion {
        for _ in 0..100 {
            let rule = node.current_rule().await;
            if rule.version >= version {
                return rule;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!(
            "node {} never observed committed version {}",
            node.node_id(),
            version
        );
    }

    // ============================================================
    // TEST 1: Election - Leader Emergence
    // ============================================================

    #[tokio::test]
    async fn test_single_node_cluster_elects_itself() {
        // ARRANGE
        let (_hub, nodes) = spawn_cluster(1).await;

        // ACT
        let leader = wait_for_leader(&nodes).await;

        // ASSERT: a one-node cluster is its own majority
        assert_eq!(leader.node_id(), 1);
        assert!(leader.current_term().await >= 1);

        // ACT: versions increase strictly across commits
        let first = leader.propose("a {}".to_string()).await.unwrap();
        let second = leader.propose("b {}".to_string()).await.unwrap();
        let third = leader.propose("c {}".to_string()).await.unwrap();

        // ASSERT
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(third.version, 3);
        assert_eq!(leader.current_rule().await.format_str, "c {}");
    }

    #[tokio::test]
    async fn test_three_node_cluster_elects_exactly_one_leader() {
        // ARRANGE
        let (_hub, nodes) = spawn_cluster(3).await;

        // ACT
        wait_for_leader(&nodes).await;
        // Let the heartbeat cadence settle before counting roles.
        tokio::time::sleep(Duration::from_millis(400)).await;

        // ASSERT: exactly one leader, and no two leaders share a term
        let mut leaders = Vec::new();
        for node in &nodes {
            if node.role().await == RaftRole::Leader {
                leaders.push((node.node_id(), node.current_term().await));
            }
        }
        assert_eq!(leaders.len(), 1, "split brain: {:?}", leaders);
    }

    #[tokio::test]
    async fn test_leader_stays_stable_under_heartbeats() {
        // ARRANGE
        let (_hub, nodes) = spawn_cluster(3).await;
        let leader = wait_for_leader(&nodes).await;
        let term = leader.current_term().await;

        // ACT: several election timeouts' worth of quiet operation
        tokio::time::sleep(Duration::from_millis(1200)).await;

        // ASSERT: heartbeats suppressed every new election
        assert_eq!(leader.role().await, RaftRole::Leader);
        assert_eq!(leader.current_term().await, term);
    }

    // ============================================================
    // TEST 2: Election - Vote Accounting
    // ============================================================

    #[tokio::test]
    async fn test_vote_granted_once_per_term() {
        // ARRANGE: a bare node receiving vote requests directly
        let hub = LoopbackHub::new();
        let node = FormatConsensus::new(1, vec![2, 3], hub.transport(1));

        // ACT: two candidates ask for the same term
        let first = node
            .handle_vote_request(VoteRequest {
                candidate_id: 2,
                term: 5,
                last_log_version: 0,
            })
            .await;
        let rival = node
            .handle_vote_request(VoteRequest {
                candidate_id: 3,
                term: 5,
                last_log_version: 0,
            })
            .await;
        let repeat = node
            .handle_vote_request(VoteRequest {
                candidate_id: 2,
                term: 5,
                last_log_version: 0,
            })
            .await;

        // ASSERT: one vote per term, but re-asking is idempotent
        assert!(first.granted);
        assert!(!rival.granted);
        assert!(repeat.granted);
        assert_eq!(first.term, 5);
    }

    #[tokio::test]
    async fn test_vote_denied_to_less_complete_log() {
        // ARRANGE: a node holding a replicated entry at version 1
        let hub = LoopbackHub::new();
        let node = FormatConsensus::new(1, vec![2, 3], hub.transport(1));
        let entry = LogEntry {
            term: 1,
            rule: RuleVersion::next(0, "x {}".to_string()),
        };
        let seeded = node
            .handle_append_entries(AppendEntriesRequest {
                leader_id: 2,
                term: 1,
                entries: vec![entry],
                leader_commit: 1,
            })
            .await;
        assert!(seeded.acknowledged);

        // ACT: a candidate whose log is empty asks for a newer term
        let behind = node
            .handle_vote_request(VoteRequest {
                candidate_id: 3,
                term: 2,
                last_log_version: 0,
            })
            .await;

        // ASSERT: the vote is withheld so the committed entry cannot be lost
        assert!(!behind.granted);
        assert_eq!(behind.term, 2);

        // ACT: a candidate at least as complete gets the vote
        let complete = node
            .handle_vote_request(VoteRequest {
                candidate_id: 3,
                term: 3,
                last_log_version: 1,
            })
            .await;

        // ASSERT
        assert!(complete.granted);
    }

    #[tokio::test]
    async fn test_higher_term_vote_request_demotes_leader() {
        // ARRANGE
        let (_hub, nodes) = spawn_cluster(3).await;
        let leader = wait_for_leader(&nodes).await;
        let term = leader.current_term().await;

        // ACT: a vote request from a future term arrives at the leader
        let response = leader
            .handle_vote_request(VoteRequest {
                candidate_id: 99,
                term: term + 10,
                last_log_version: 0,
            })
            .await;

        // ASSERT: the leader adopted the term and stepped down
        assert_eq!(response.term, term + 10);
        assert_eq!(leader.role().await, RaftRole::Follower);
    }

    // ============================================================
    // TEST 3: Replication - Commit Path
    // ============================================================

    #[tokio::test]
    async fn test_propose_replicates_to_all_nodes() {
        // ARRANGE
        let (_hub, nodes) = spawn_cluster(3).await;
        let leader = wait_for_leader(&nodes).await;

        // ACT
        let rule = leader.propose("count={}".to_string()).await.unwrap();

        // ASSERT
        assert_eq!(rule.version, 1);
        assert!(rule.checksum_ok());
        for node in &nodes {
            let observed = wait_for_rule(node, 1).await;
            assert_eq!(observed, rule);
            assert_eq!(observed.format_str, "count={}");
        }
    }

    #[tokio::test]
    async fn test_propose_on_follower_returns_leader_hint() {
        // ARRANGE
        let (_hub, nodes) = spawn_cluster(3).await;
        let leader = wait_for_leader(&nodes).await;
        // Give heartbeats a beat to propagate the leader hint.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let follower = nodes
            .iter()
            .find(|n| n.node_id() != leader.node_id())
            .unwrap();

        // ACT
        let result = follower.propose("x {}".to_string()).await;

        // ASSERT
        match result {
            Err(ClusterError::NotLeader { leader_hint }) => {
                assert_eq!(leader_hint, Some(leader.node_id()));
            }
            other => panic!("expected NotLeader, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_propose_or_forward_commits_from_follower() {
        // ARRANGE
        let (_hub, nodes) = spawn_cluster(3).await;
        let leader = wait_for_leader(&nodes).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        let follower = nodes
            .iter()
            .find(|n| n.node_id() != leader.node_id())
            .unwrap();

        // ACT
        let rule = follower
            .propose_or_forward("op-1", "forwarded {}")
            .await
            .unwrap();

        // ASSERT
        assert_eq!(rule.version, 1);
        assert_eq!(rule.format_str, "forwarded {}");
        assert_eq!(leader.current_rule().await, rule);
    }

    #[tokio::test]
    async fn test_forwarded_proposal_is_deduplicated() {
        // ARRANGE
        let (_hub, nodes) = spawn_cluster(3).await;
        let leader = wait_for_leader(&nodes).await;

        // ACT: the same forwarded op lands twice (a retried forward)
        let first = leader
            .handle_forward_propose(ForwardProposeRequest {
                op_id: "op-42".to_string(),
                format_str: "once {}".to_string(),
            })
            .await;
        let second = leader
            .handle_forward_propose(ForwardProposeRequest {
                op_id: "op-42".to_string(),
                format_str: "once {}".to_string(),
            })
            .await;

        // ASSERT: one commit, the retry answered from the ledger
        let first_rule = first.rule.unwrap();
        let second_rule = second.rule.unwrap();
        assert_eq!(first_rule.version, 1);
        assert_eq!(second_rule.version, 1);
        assert_eq!(leader.current_rule().await.version, 1);
    }

    // ============================================================
    // TEST 4: Replication - Integrity and Idempotence
    // ============================================================

    #[tokio::test]
    async fn test_append_rejects_checksum_mismatch() {
        // ARRANGE: an entry whose payload was corrupted after checksumming
        let hub = LoopbackHub::new();
        let node = FormatConsensus::new(1, vec![2, 3], hub.transport(1));
        let mut rule = RuleVersion::next(0, "intact {}".to_string());
        rule.format_str = "tampered {}".to_string();

        // ACT
        let response = node
            .handle_append_entries(AppendEntriesRequest {
                leader_id: 2,
                term: 1,
                entries: vec![LogEntry { term: 1, rule }],
                leader_commit: 1,
            })
            .await;

        // ASSERT: rejected and never applied
        assert!(!response.acknowledged);
        assert!(node.current_rule().await.is_unset());
    }

    #[tokio::test]
    async fn test_append_retry_is_idempotent() {
        // ARRANGE
        let hub = LoopbackHub::new();
        let node = FormatConsensus::new(1, vec![2, 3], hub.transport(1));
        let entry = LogEntry {
            term: 1,
            rule: RuleVersion::next(0, "retry {}".to_string()),
        };
        let request = AppendEntriesRequest {
            leader_id: 2,
            term: 1,
            entries: vec![entry],
            leader_commit: 1,
        };

        // ACT: the leader retries the same replication round
        let first = node.handle_append_entries(request.clone()).await;
        let second = node.handle_append_entries(request).await;

        // ASSERT: both acknowledged, applied exactly once
        assert!(first.acknowledged);
        assert!(second.acknowledged);
        assert_eq!(node.current_rule().await.version, 1);
        assert_eq!(node.current_rule().await.format_str, "retry {}");
    }

    #[tokio::test]
    async fn test_stale_term_append_is_dropped() {
        // ARRANGE: node already in term 5
        let hub = LoopbackHub::new();
        let node = FormatConsensus::new(1, vec![2, 3], hub.transport(1));
        node.handle_vote_request(VoteRequest {
            candidate_id: 2,
            term: 5,
            last_log_version: 0,
        })
        .await;

        // ACT: an append from a deposed leader still in term 3
        let response = node
            .handle_append_entries(AppendEntriesRequest {
                leader_id: 3,
                term: 3,
                entries: vec![],
                leader_commit: 0,
            })
            .await;

        // ASSERT: refused, and the response carries the newer term
        assert!(!response.acknowledged);
        assert_eq!(response.term, 5);
    }

    // ============================================================
    // TEST 5: Failover - Partitions and Convergence
    // ============================================================

    #[tokio::test]
    async fn test_partitioned_leader_cannot_commit() {
        // ARRANGE: a healthy commit, then the leader loses its peers
        let (hub, nodes) = spawn_cluster(3).await;
        let leader = wait_for_leader(&nodes).await;
        leader.propose("healthy {}".to_string()).await.unwrap();
        for node in &nodes {
            wait_for_rule(node, 1).await;
        }
        hub.isolate(leader.node_id());

        // ACT: the cut-off leader tries to commit a second rule
        let result = leader.propose("doomed {}".to_string()).await;

        // ASSERT: only its own append counts, short of the majority of 2
        match result {
            Err(ClusterError::ReplicationTimeout { acks, needed }) => {
                assert_eq!(acks, 1);
                assert_eq!(needed, 2);
            }
            other => panic!("expected ReplicationTimeout, got {:?}", other),
        }
        assert_eq!(leader.current_rule().await.format_str, "healthy {}");
    }

    #[tokio::test]
    async fn test_majority_side_elects_replacement_and_cluster_converges() {
        // ARRANGE: committed v1 everywhere, then the leader is cut off with
        // an uncommitted entry stranded in its log
        let (hub, nodes) = spawn_cluster(3).await;
        let old_leader = wait_for_leader(&nodes).await;
        old_leader.propose("v1 {}".to_string()).await.unwrap();
        for node in &nodes {
            wait_for_rule(node, 1).await;
        }
        hub.isolate(old_leader.node_id());
        let _ = old_leader.propose("stranded {}".to_string()).await;

        // ACT: the majority side elects a replacement and commits past the
        // stranded entry
        let new_leader = wait_for_leader_among(&nodes, old_leader.node_id()).await;
        let replacement = new_leader.propose("v2 {}".to_string()).await.unwrap();
        assert_eq!(replacement.version, 2);

        hub.heal_all();

        // ASSERT: the old leader steps down and adopts the replacement
        // entry, discarding its stranded one
        let converged = wait_for_rule(&old_leader, 2).await;
        assert_eq!(converged.format_str, "v2 {}");
        for _ in 0..100 {
            if old_leader.role().await == RaftRole::Follower {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(old_leader.role().await, RaftRole::Follower);

        // ASSERT: one consistent rule across the whole cluster
        for node in &nodes {
            assert_eq!(wait_for_rule(node, 2).await, replacement);
        }
    }

    #[tokio::test]
    async fn test_committed_rule_survives_leader_crash() {
        // ARRANGE: the leader commits v1 (majority holds the entry), then
        // dies before another heartbeat
        let (hub, nodes) = spawn_cluster(3).await;
        let leader = wait_for_leader(&nodes).await;
        let committed = leader.propose("survivor {}".to_string()).await.unwrap();
        hub.isolate(leader.node_id());
        leader.stop();

        // ACT: the survivors elect a replacement
        let new_leader = wait_for_leader_among(&nodes, leader.node_id()).await;

        // ASSERT: the vote completeness check guarantees the replacement
        // holds v1, and taking office commits it
        let observed = wait_for_rule(&new_leader, 1).await;
        assert_eq!(observed, committed);
        assert_eq!(observed.format_str, "survivor {}");

        // ASSERT: history continues after it, never over it
        let next = new_leader.propose("after {}".to_string()).await.unwrap();
        assert_eq!(next.version, 2);
    }
}
