//! Parallel Formatting Engine
//!
//! Renders large collections against one fixed rule snapshot. The input is
//! split into contiguous shards, each shard is rendered by its own task on a
//! bounded worker pool, and the per-shard outputs are reassembled in input
//! order once every task has finished.
//!
//! ## Guarantees
//! - **Snapshot consistency**: the caller passes one `RuleVersion` and every
//!   shard renders against exactly that version, even if the consensus layer
//!   commits a newer rule mid-call.
//! - **Fault isolation**: a render failure inside one shard converts that
//!   shard's outcome to a failure; sibling shards run to completion.
//! - **All-or-nothing results**: if any shard failed, the whole call fails
//!   naming the shard, and successful shards' output is discarded.

use anyhow::Result;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::consensus::types::RuleVersion;
use crate::error::ClusterError;
use crate::rules::template::apply_template;

use super::types::{DataShard, ShardOutcome, ShardStatus, plan_shards};

/// Type alias for the injectable rendering function: one item plus one rule
/// snapshot in, one formatted string out. May fail.
pub type RenderFn<I> = Arc<dyn Fn(&I, &RuleVersion) -> Result<String> + Send + Sync>;

/// Fallback worker count when hardware concurrency cannot be detected.
const FALLBACK_WORKERS: usize = 4;

/// The engine that drives sharded parallel rendering.
pub struct ParallelFormatter<I> {
    render: RenderFn<I>,
    /// Maximum number of shard tasks rendering at the same time.
    max_workers: usize,
}

impl<I: Display + Send + Sync + 'static> ParallelFormatter<I> {
    /// Engine with the default renderer: apply the rule's template to the
    /// item's `Display` form.
    pub fn new(max_workers: Option<usize>) -> Self {
        Self::with_renderer(
            Arc::new(|item: &I, rule: &RuleVersion| apply_template(&rule.format_str, item)),
            max_workers,
        )
    }
}

impl<I: Send + Sync + 'static> ParallelFormatter<I> {
    /// Engine with a custom rendering function.
    pub fn with_renderer(render: RenderFn<I>, max_workers: Option<usize>) -> Self {
        let max_workers = max_workers
            .filter(|&w| w > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(FALLBACK_WORKERS)
            })
            .max(1);

        Self {
            render,
            max_workers,
        }
    }

    /// Renders a set of shards concurrently against one rule snapshot.
    ///
    /// Waits for every shard to finish (join, not cancel-on-first-failure)
    /// and returns one outcome per shard, in completion order.
    pub async fn format_shards(
        &self,
        shards: Vec<DataShard<I>>,
        rule: &RuleVersion,
    ) -> Vec<ShardOutcome> {
        let rule = Arc::new(rule.clone());
        let pool = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();

        for shard in shards {
            let render = self.render.clone();
            let rule = rule.clone();
            let pool = pool.clone();

            tasks.spawn(async move {
                // The permit bounds how many shards render at once.
                let _permit = pool.acquire_owned().await;
                render_shard(shard, &render, &rule)
            });
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    // A panicking worker must not take the whole call down
                    // silently; it surfaces at merge time like a render error.
                    tracing::error!("Shard worker panicked: {}", e);
                }
            }
        }

        outcomes
    }

    /// Full pipeline: plan shards, render them in parallel, merge in input
    /// order. A single-item call skips planning and merging entirely.
    pub async fn format_collection(
        &self,
        mut items: Vec<I>,
        rule: &RuleVersion,
        num_shards: Option<usize>,
    ) -> Result<Vec<String>, ClusterError> {
        let expected = items.len();

        // Degenerate path: one item, no parallelism overhead.
        if expected == 1 && num_shards.unwrap_or(1) <= 1 {
            if let Some(item) = items.pop() {
                let rendered =
                    (self.render)(&item, rule).map_err(|e| ClusterError::ShardRender {
                        shard_id: 0,
                        message: e.to_string(),
                    })?;
                return Ok(vec![rendered]);
            }
        }

        let planned = plan_shards(items, num_shards);
        let planned_count = planned.len();
        let mut outcomes = self.format_shards(planned, rule).await;

        // Tasks may finish out of order; input order is restored here.
        outcomes.sort_by_key(|o| o.shard_id);

        if outcomes.len() != planned_count {
            // A missing outcome means a worker panicked mid-shard.
            let missing = (0..planned_count)
                .find(|id| !outcomes.iter().any(|o| o.shard_id == *id))
                .unwrap_or(0);
            return Err(ClusterError::ShardRender {
                shard_id: missing,
                message: "shard worker did not complete".to_string(),
            });
        }

        // Any failed shard fails the whole call; partial output would hand
        // the caller an inconsistent view.
        for outcome in &outcomes {
            if let ShardStatus::Failed { error } = &outcome.status {
                return Err(ClusterError::ShardRender {
                    shard_id: outcome.shard_id,
                    message: error.clone(),
                });
            }
        }

        let mut merged = Vec::with_capacity(expected);
        for outcome in outcomes {
            merged.extend(outcome.formatted);
        }

        Ok(merged)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }
}

/// Renders every item of one shard. The first render error converts the
/// whole shard to a failure; items before it are discarded with the shard.
fn render_shard<I>(shard: DataShard<I>, render: &RenderFn<I>, rule: &RuleVersion) -> ShardOutcome {
    let mut formatted = Vec::with_capacity(shard.items.len());

    for item in &shard.items {
        match render(item, rule) {
            Ok(s) => formatted.push(s),
            Err(e) => {
                tracing::warn!(
                    "Shard {}/{} failed to render: {}",
                    shard.shard_id,
                    shard.total_shards,
                    e
                );
                return ShardOutcome {
                    shard_id: shard.shard_id,
                    formatted: Vec::new(),
                    rule_version: rule.version,
                    status: ShardStatus::Failed {
                        error: e.to_string(),
                    },
                };
            }
        }
    }

    ShardOutcome {
        shard_id: shard.shard_id,
        formatted,
        rule_version: rule.version,
        status: ShardStatus::Success,
    }
}
