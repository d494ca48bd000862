//! Sharded Execution Engine Module
//!
//! Applies the committed format rule to bulk data: the input collection is
//! partitioned into contiguous shards, shards are rendered in parallel on a
//! bounded worker pool against one rule snapshot, and results are merged
//! back in input order (or the call fails naming the broken shard).
//!
//! ## Submodules
//! - **`formatter`**: The `ParallelFormatter` worker-pool engine.
//! - **`types`**: Shards, per-shard outcomes, and the shard planner.

pub mod formatter;
pub mod types;

#[cfg(test)]
mod tests;
