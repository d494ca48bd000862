//! Cluster Module
//!
//! The application-facing layer above consensus: one synchronizer per node
//! keeps the local rule view converged with the cluster, and one context
//! object exposes the whole system (set rule, wait for version, render
//! data) behind a single handle.
//!
//! ## Submodules
//! - **`synchronizer`**: Topology config and the `RuleSynchronizer`.
//! - **`context`**: The `DistributedFormatContext` facade.
//! - **`protocol`**: Public HTTP API DTOs.
//! - **`handlers`**: Axum handlers for the public API.

pub mod context;
pub mod handlers;
pub mod protocol;
pub mod synchronizer;
