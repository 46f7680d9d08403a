//! Historical reconstruction by cumulative bucket snapshots
//!
//! The observed range of content-item timestamps is split into evenly spaced
//! boundaries. Each snapshot counts every create record observed at or before
//! its boundary, so the series is cumulative and never decreases.

use super::db::RecordStore;
use super::error::PipelineResult;
use serde::{Deserialize, Serialize};

/// Default bucket count for `/api/historical`
pub const DEFAULT_BUCKETS: usize = 20;

/// Upper bound on bucket count
pub const MAX_BUCKETS: usize = 500;

/// Cumulative counts as of one bucket boundary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalPoint {
    pub timestamp: i64,
    pub posts: u64,
    pub threadgates: u64,
    pub postgates: u64,
    pub top_level_posts: u64,
    pub top_level_posts_with_thread_gate: u64,
}

/// Evenly spaced boundaries across `[min_ts, max_ts]`, both ends inclusive
///
/// Boundary `i` is `min_ts + (max_ts - min_ts) * i / (bucket_count - 1)`
/// using integer division. A single bucket sits on `max_ts` so that it
/// covers the full range.
pub fn bucket_boundaries(min_ts: i64, max_ts: i64, bucket_count: usize) -> Vec<i64> {
    match bucket_count {
        0 => Vec::new(),
        1 => vec![max_ts],
        n => {
            let span = i128::from(max_ts) - i128::from(min_ts);
            let steps = (n - 1) as i128;
            (0..n)
                .map(|i| {
                    let offset = span * i as i128 / steps;
                    (i128::from(min_ts) + offset) as i64
                })
                .collect()
        }
    }
}

/// Sample the store into `bucket_count` cumulative snapshots, oldest first
///
/// Returns an empty series when no content items exist. `bucket_count` is
/// clamped to `max_buckets`.
pub async fn sample(
    store: &dyn RecordStore,
    bucket_count: usize,
    max_buckets: usize,
) -> PipelineResult<Vec<HistoricalPoint>> {
    let bucket_count = bucket_count.min(max_buckets);
    if bucket_count == 0 {
        return Ok(Vec::new());
    }

    let Some((min_ts, max_ts)) = store.timestamp_range().await? else {
        return Ok(Vec::new());
    };

    let boundaries = bucket_boundaries(min_ts, max_ts, bucket_count);
    store.cumulative_counts(&boundaries).await
}
