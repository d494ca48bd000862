//! Distributed Format Context
//!
//! The single entry point an application holds on each node: set the
//! cluster-wide rule, read it, wait for it to advance, and render data
//! against it. Bulk renders go through the sharded parallel engine with one
//! rule snapshot taken at call start.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use crate::consensus::transport::RaftTransport;
use crate::consensus::types::RuleVersion;
use crate::engine::formatter::ParallelFormatter;
use crate::error::ClusterError;
use crate::rules::template::apply_template;

use super::synchronizer::RuleSynchronizer;

pub struct DistributedFormatContext<T: RaftTransport> {
    synchronizer: Arc<RuleSynchronizer<T>>,
    /// Worker bound handed to the parallel engine; None picks the hardware
    /// default.
    max_workers: Option<usize>,
}

impl<T: RaftTransport> DistributedFormatContext<T> {
    pub fn new(synchronizer: Arc<RuleSynchronizer<T>>, max_workers: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            synchronizer,
            max_workers,
        })
    }

    /// Proposes `format_str` as the new cluster-wide rule and returns the
    /// committed version.
    pub async fn set_format(&self, format_str: &str) -> Result<RuleVersion, ClusterError> {
        self.synchronizer.update_rule(format_str).await
    }

    pub async fn current_rule(&self) -> RuleVersion {
        self.synchronizer.current_rule().await
    }

    pub async fn wait_for_version(
        &self,
        min_version: u64,
        timeout: Duration,
    ) -> Result<RuleVersion, ClusterError> {
        self.synchronizer.wait_for_version(min_version, timeout).await
    }

    /// Renders a whole collection against one snapshot of the current rule.
    ///
    /// The snapshot is taken once at call start; a rule committed mid-call
    /// affects only later calls. Fails with `NoRuleSet` before the first
    /// commit.
    pub async fn format_all<I>(
        &self,
        items: Vec<I>,
        num_shards: Option<usize>,
    ) -> Result<Vec<String>, ClusterError>
    where
        I: Display + Send + Sync + 'static,
    {
        let rule = self.snapshot_rule().await?;
        let formatter = ParallelFormatter::new(self.max_workers);
        formatter.format_collection(items, &rule, num_shards).await
    }

    /// Renders a single value against the current rule.
    pub async fn format_one<I: Display>(&self, item: &I) -> Result<String, ClusterError> {
        let rule = self.snapshot_rule().await?;
        apply_template(&rule.format_str, item).map_err(|e| ClusterError::ShardRender {
            shard_id: 0,
            message: e.to_string(),
        })
    }

    pub fn synchronizer(&self) -> &Arc<RuleSynchronizer<T>> {
        &self.synchronizer
    }

    async fn snapshot_rule(&self) -> Result<RuleVersion, ClusterError> {
        let rule = self.synchronizer.current_rule().await;
        if rule.is_unset() {
            return Err(ClusterError::NoRuleSet);
        }
        Ok(rule)
    }
}
