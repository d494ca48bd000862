/// Default number of items per shard when no explicit shard count is given.
/// Bounds per-task overhead for small inputs while capping task count for
/// very large ones.
pub const DEFAULT_SHARD_SIZE: usize = 1000;

/// A contiguous partition of one input collection.
///
/// Created at the start of one format call, rendered by exactly one worker,
/// and discarded after its results are merged.
#[derive(Debug)]
pub struct DataShard<I> {
    pub items: Vec<I>,
    /// 0-based position of this shard within the call.
    pub shard_id: usize,
    pub total_shards: usize,
    pub is_last: bool,
}

/// Terminal state of one shard's rendering work.
#[derive(Debug, Clone, PartialEq)]
pub enum ShardStatus {
    Success,
    Failed { error: String },
}

/// What one worker produced for one shard.
///
/// `formatted` is parallel to the shard's items and only meaningful when
/// `status` is `Success`.
#[derive(Debug)]
pub struct ShardOutcome {
    pub shard_id: usize,
    pub formatted: Vec<String>,
    /// Version of the rule snapshot this shard rendered against.
    pub rule_version: u64,
    pub status: ShardStatus,
}

impl ShardOutcome {
    pub fn is_success(&self) -> bool {
        self.status == ShardStatus::Success
    }
}

/// Splits a collection into contiguous shards.
///
/// With an explicit `num_shards` the chunk size is `ceil(len / num_shards)`;
/// otherwise the count is derived from [`DEFAULT_SHARD_SIZE`]. Shard `i`
/// covers `[i*chunk, min((i+1)*chunk, len))`, so the shards cover the input
/// exactly once, in order, and only the last shard may be shorter. Empty
/// shards are never produced.
pub fn plan_shards<I>(items: Vec<I>, num_shards: Option<usize>) -> Vec<DataShard<I>> {
    let len = items.len();
    if len == 0 {
        return Vec::new();
    }

    let requested = match num_shards {
        Some(s) => s.max(1),
        None => len.div_ceil(DEFAULT_SHARD_SIZE),
    };
    let chunk = len.div_ceil(requested);
    let total = len.div_ceil(chunk);

    tracing::debug!(
        "Planned {} shard(s) of up to {} item(s) for {} input item(s)",
        total,
        chunk,
        len
    );

    let mut shards = Vec::with_capacity(total);
    let mut items = items.into_iter();
    for shard_id in 0..total {
        let take = chunk.min(len - shard_id * chunk);
        shards.push(DataShard {
            items: items.by_ref().take(take).collect(),
            shard_id,
            total_shards: total,
            is_last: shard_id == total - 1,
        });
    }

    shards
}
