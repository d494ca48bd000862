//! Engine Module Tests
//!
//! This module contains unit and integration tests for the sharded parallel
//! formatting engine.
//!
//! ## Test Scopes
//! - **Shard Planning**: Verifies contiguous splitting, default sizing, and edge inputs.
//! - **Parallel Rendering**: Validates ordered merge, snapshot consistency, and worker bounds.
//! - **Fault Isolation**: Ensures one failing shard fails the call while siblings complete.

#[cfg(test)]
mod tests {
    use crate::consensus::types::RuleVersion;
    use crate::engine::formatter::ParallelFormatter;
    use crate::engine::types::{plan_shards, DEFAULT_SHARD_SIZE};
    use crate::error::ClusterError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn rule_with(format_str: &str) -> RuleVersion {
        RuleVersion::next(0, format_str.to_string())
    }

    // ============================================================
    // TEST 1: Shard Planner - Default Sizing
    // ============================================================

    #[test]
    fn test_plan_shards_default_size() {
        // ARRANGE: 2500 items with no explicit shard count
        let items: Vec<u64> = (0..2500).collect();

        // ACT
        let shards = plan_shards(items, None);

        // ASSERT: ceil(2500 / 1000) = 3 shards of 1000 / 1000 / 500
        assert_eq!(shards.len(), 3);
        assert_eq!(shards[0].items.len(), DEFAULT_SHARD_SIZE);
        assert_eq!(shards[1].items.len(), DEFAULT_SHARD_SIZE);
        assert_eq!(shards[2].items.len(), 500);
        assert!(shards[2].is_last);
        assert!(!shards[0].is_last);

        // ASSERT: shards are contiguous and cover the input exactly once
        assert_eq!(shards[0].items[0], 0);
        assert_eq!(shards[1].items[0], 1000);
        assert_eq!(shards[2].items[0], 2000);
        assert_eq!(*shards[2].items.last().unwrap(), 2499);
    }

    #[test]
    fn test_plan_shards_explicit_count() {
        // ARRANGE: 10 items across 4 requested shards
        let items: Vec<u64> = (0..10).collect();

        // ACT
        let shards = plan_shards(items, Some(4));

        // ASSERT: chunk = ceil(10/4) = 3, so shards are 3/3/3/1
        assert_eq!(shards.len(), 4);
        assert_eq!(shards[0].items.len(), 3);
        assert_eq!(shards[3].items.len(), 1);
        for (i, shard) in shards.iter().enumerate() {
            assert_eq!(shard.shard_id, i);
            assert_eq!(shard.total_shards, 4);
        }
    }

    #[test]
    fn test_plan_shards_never_emits_empty_shards() {
        // ARRANGE: more requested shards than items
        let items: Vec<u64> = (0..3).collect();

        // ACT
        let shards = plan_shards(items, Some(10));

        // ASSERT: only 3 one-item shards exist
        assert_eq!(shards.len(), 3);
        assert!(shards.iter().all(|s| s.items.len() == 1));
    }

    #[test]
    fn test_plan_shards_empty_input() {
        let shards = plan_shards(Vec::<u64>::new(), None);
        assert!(shards.is_empty());
    }

    // ============================================================
    // TEST 2: Parallel Rendering - Ordered Merge
    // ============================================================

    #[tokio::test]
    async fn test_format_collection_preserves_input_order() {
        // ARRANGE: enough items to span several shards, few workers so
        // completion order scrambles
        let formatter = ParallelFormatter::<u64>::new(Some(2));
        let items: Vec<u64> = (0..57).collect();
        let rule = rule_with("item {}");

        // ACT
        let result = formatter
            .format_collection(items, &rule, Some(8))
            .await
            .unwrap();

        // ASSERT: output is parallel to the input, in input order
        assert_eq!(result.len(), 57);
        for (i, line) in result.iter().enumerate() {
            assert_eq!(line, &format!("item {}", i));
        }
    }

    #[tokio::test]
    async fn test_format_collection_ordered_for_every_shard_count() {
        // ARRANGE: a small input checked exhaustively over shard counts
        let formatter = ParallelFormatter::<u64>::new(Some(3));
        let rule = rule_with("{}");
        let len = 12u64;

        for shard_count in 1..=len as usize {
            // ACT
            let result = formatter
                .format_collection((0..len).collect(), &rule, Some(shard_count))
                .await
                .unwrap();

            // ASSERT: exactly L outputs, in input order, for every S
            assert_eq!(result.len(), len as usize, "S = {}", shard_count);
            for (i, line) in result.iter().enumerate() {
                assert_eq!(line, &i.to_string(), "S = {}", shard_count);
            }
        }
    }

    #[tokio::test]
    async fn test_format_collection_default_sharding_large_batch() {
        // ARRANGE: 2500 items, default size-based planning (3 shards)
        let formatter = ParallelFormatter::<u64>::new(Some(4));
        let rule = rule_with("row {}");

        // ACT
        let result = formatter
            .format_collection((0..2500).collect(), &rule, None)
            .await
            .unwrap();

        // ASSERT: merged back into 2500 ordered outputs
        assert_eq!(result.len(), 2500);
        assert_eq!(result[0], "row 0");
        assert_eq!(result[1000], "row 1000");
        assert_eq!(result[2499], "row 2499");
    }

    #[tokio::test]
    async fn test_format_collection_single_item_fast_path() {
        // ARRANGE
        let formatter = ParallelFormatter::<u64>::new(Some(4));
        let rule = rule_with("value={}");

        // ACT
        let result = formatter
            .format_collection(vec![42], &rule, None)
            .await
            .unwrap();

        // ASSERT
        assert_eq!(result, vec!["value=42".to_string()]);
    }

    #[tokio::test]
    async fn test_format_collection_empty_input() {
        let formatter = ParallelFormatter::<u64>::new(Some(4));
        let rule = rule_with("{}");

        let result = formatter
            .format_collection(Vec::new(), &rule, None)
            .await
            .unwrap();

        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_format_shards_renders_against_one_snapshot() {
        // ARRANGE: a renderer that records which rule version it saw
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        let formatter = ParallelFormatter::<u64>::with_renderer(
            Arc::new(move |item, rule| {
                seen_clone.fetch_max(rule.version as usize, Ordering::SeqCst);
                Ok(format!("{}@{}", item, rule.version))
            }),
            Some(4),
        );
        let rule = rule_with("{}");
        assert_eq!(rule.version, 1);

        // ACT
        let result = formatter
            .format_collection((0..20).collect(), &rule, Some(5))
            .await
            .unwrap();

        // ASSERT: every shard rendered against version 1 and nothing else
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(result.iter().all(|s| s.ends_with("@1")));
    }

    // ============================================================
    // TEST 3: Fault Isolation - One Failing Shard
    // ============================================================

    #[tokio::test]
    async fn test_failing_shard_fails_call_but_siblings_complete() {
        // ARRANGE: 4 shards of 5 items; items 10..15 (shard 2) fail. A
        // side-channel counter proves sibling shards still ran.
        let rendered = Arc::new(AtomicUsize::new(0));
        let rendered_clone = rendered.clone();
        let formatter = ParallelFormatter::<u64>::with_renderer(
            Arc::new(move |item: &u64, _rule| {
                if (10..15).contains(item) {
                    anyhow::bail!("bad item {}", item);
                }
                rendered_clone.fetch_add(1, Ordering::SeqCst);
                Ok(item.to_string())
            }),
            Some(4),
        );
        let rule = rule_with("{}");

        // ACT
        let result = formatter
            .format_collection((0..20).collect(), &rule, Some(4))
            .await;

        // ASSERT: the call fails and names the broken shard
        match result {
            Err(ClusterError::ShardRender { shard_id, message }) => {
                assert_eq!(shard_id, 2);
                assert!(message.contains("bad item 10"));
            }
            other => panic!("expected ShardRender error, got {:?}", other),
        }

        // ASSERT: the three healthy shards (15 items) rendered to completion
        assert_eq!(rendered.load(Ordering::SeqCst), 15);
    }

    #[tokio::test]
    async fn test_render_failure_on_single_item_path() {
        // ARRANGE
        let formatter = ParallelFormatter::<u64>::with_renderer(
            Arc::new(|_item, _rule| anyhow::bail!("renderer down")),
            Some(1),
        );
        let rule = rule_with("{}");

        // ACT
        let result = formatter.format_collection(vec![7], &rule, None).await;

        // ASSERT
        match result {
            Err(ClusterError::ShardRender { shard_id, message }) => {
                assert_eq!(shard_id, 0);
                assert!(message.contains("renderer down"));
            }
            other => panic!("expected ShardRender error, got {:?}", other),
        }
    }

    // ============================================================
    // TEST 4: Worker Pool Bounds
    // ============================================================

    #[tokio::test]
    async fn test_worker_count_defaults_and_floor() {
        let auto = ParallelFormatter::<u64>::new(None);
        assert!(auto.max_workers() >= 1);

        let floored = ParallelFormatter::<u64>::new(Some(0));
        assert!(floored.max_workers() >= 1);

        let fixed = ParallelFormatter::<u64>::new(Some(3));
        assert_eq!(fixed.max_workers(), 3);
    }

    #[tokio::test]
    async fn test_default_renderer_uses_rule_template() {
        // ARRANGE: default renderer applies the committed template to Display
        let formatter = ParallelFormatter::<&str>::new(Some(2));
        let rule = rule_with("[{}]");

        // ACT
        let result = formatter
            .format_collection(vec!["a", "b", "c"], &rule, Some(2))
            .await
            .unwrap();

        // ASSERT
        assert_eq!(result, vec!["[a]", "[b]", "[c]"]);
    }
}
