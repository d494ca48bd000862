//! Distributed Format Rule Cluster Library
//!
//! This library crate defines the core modules that make up the replicated
//! formatting system. It serves as the foundation for the binary executable
//! (`main.rs`).
//!
//! ## Architecture Modules
//! The system is composed of five loosely coupled subsystems:
//!
//! - **`consensus`**: The replication core. Elects one leader per term with
//!   randomized timeouts, replicates versioned format rules to a majority
//!   before committing, and carries stale replicas forward via heartbeats.
//! - **`cluster`**: The application-facing layer. A per-node synchronizer
//!   keeps the local rule view converged, and the distributed context
//!   exposes set/read/wait/render behind one handle.
//! - **`engine`**: The sharded parallel execution engine. Splits bulk data
//!   into contiguous shards and renders them on a bounded worker pool
//!   against one rule snapshot.
//! - **`rules`**: The formatting logic itself. The placeholder template
//!   engine, the sample-driven format recommender, and the cross-dialect
//!   template converter.
//! - **`checksum`** / **`error`**: Payload integrity digests and the typed
//!   error surface shared by every layer.

pub mod checksum;
pub mod cluster;
pub mod consensus;
pub mod engine;
pub mod error;
pub mod rules;
