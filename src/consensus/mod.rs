//! Consensus Module
//!
//! Implements leader election and single-writer commit for the replicated
//! format rule. Any node accepts a proposal; only the elected leader
//! versions, checksums and replicates it, and the proposal succeeds only
//! once a strict majority of the cluster has acknowledged the entry.
//!
//! ## Core Mechanisms
//! - **Randomized election timers** (150-300ms) so partitions recover without
//!   synchronized split votes; heartbeats (75ms) keep a live leader in place.
//! - **Term bookkeeping**: any message carrying a higher term demotes the
//!   receiver to follower; at most one leader can exist per term.
//! - **Versioned log**: each committed rule is an immutable
//!   `RuleVersion {version, payload, timestamp, checksum}`; replicas reject
//!   entries whose checksum does not match their payload.
//!
//! ## Submodules
//! - **`manager`**: The per-node state machine (`FormatConsensus`).
//! - **`types`**: Roles, versioned rules, log entries, node state.
//! - **`protocol`**: RPC DTOs and the endpoints they are mounted on.
//! - **`transport`**: The `RaftTransport` trait with HTTP and in-process
//!   (loopback) implementations.
//! - **`handlers`**: Axum handlers exposing the RPC surface.

pub mod handlers;
pub mod manager;
pub mod protocol;
pub mod transport;
pub mod types;

#[cfg(test)]
mod tests;
