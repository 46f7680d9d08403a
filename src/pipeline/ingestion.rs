//! Pipeline ingestion - async channel processor for stream events
//!
//! Events arrive from the Jetstream client over an mpsc channel and are
//! applied one at a time, in arrival order, through the single writer.

use super::db::RecordStore;
use super::error::{PipelineError, PipelineResult};
use super::normalizer::normalize;
use super::types::{IncomingEvent, Record};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, Instant};

/// Interval between throughput log lines
const THROUGHPUT_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Totals reported when ingestion stops cleanly
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionSummary {
    pub stored: u64,
    pub dropped: u64,
}

/// Normalize and upsert a single event
pub async fn process_event(store: &dyn RecordStore, event: &IncomingEvent) -> PipelineResult<Record> {
    let record = normalize(event)?;
    store.upsert(&record).await?;
    Ok(record)
}

/// Start pipeline ingestion from the event channel
///
/// Main loop:
/// 1. Receives events from the stream client via mpsc channel
/// 2. Normalizes and upserts each one
/// 3. Advances `cursor` to the event's `observed_at_micros` once it is
///    stored or dropped as malformed
///
/// Returns when the channel closes. A store write failure stops the loop
/// immediately with `StoreUnavailable`; the cursor is left on the last
/// event that was fully handled so it is redelivered after restart.
pub async fn start_pipeline_ingestion(
    mut rx: mpsc::Receiver<IncomingEvent>,
    store: Arc<dyn RecordStore>,
    cursor: Arc<AtomicI64>,
) -> PipelineResult<IngestionSummary> {
    log::info!("🚀 Starting pipeline ingestion");
    log::info!("   └─ Waiting for events...");

    let mut throughput_timer = interval(THROUGHPUT_LOG_INTERVAL);
    throughput_timer.tick().await;

    let mut summary = IngestionSummary::default();
    let mut window_events = 0u64;
    let mut window_start = Instant::now();

    loop {
        tokio::select! {
            maybe_event = rx.recv() => {
                let Some(event) = maybe_event else {
                    log::warn!("⚠️  Event channel closed, stopping ingestion");
                    break;
                };

                match process_event(store.as_ref(), &event).await {
                    Ok(record) => {
                        log::debug!("📥 {} {} {}", event.operation, record.kind().as_str(), record.uri());
                        summary.stored += 1;
                    }
                    Err(PipelineError::MalformedEvent(reason)) => {
                        log::warn!("⚠️  Dropped malformed event {}: {}", event.uri, reason);
                        summary.dropped += 1;
                    }
                    Err(e) => {
                        log::error!("❌ Store write failed on {}: {}", event.uri, e);
                        return Err(e);
                    }
                }

                cursor.fetch_max(event.observed_at_micros, Ordering::SeqCst);
                window_events += 1;
            }

            _ = throughput_timer.tick() => {
                let elapsed = window_start.elapsed().as_secs_f64();
                if elapsed > 0.0 {
                    log::info!(
                        "📊 Ingestion rate: {:.1} events/sec (stored: {}, dropped: {}) | channel: {}",
                        window_events as f64 / elapsed,
                        summary.stored,
                        summary.dropped,
                        rx.len()
                    );
                }
                window_events = 0;
                window_start = Instant::now();
            }
        }
    }

    log::info!(
        "✅ Pipeline ingestion stopped (stored: {}, dropped: {})",
        summary.stored,
        summary.dropped
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::db::SqliteRecordStore;
    use crate::pipeline::types::RecordKind;
    use async_trait::async_trait;
    use serde_json::json;

    fn post_event(uri: &str, observed: i64) -> IncomingEvent {
        IncomingEvent {
            uri: uri.to_string(),
            kind: "content".to_string(),
            operation: "create".to_string(),
            author_id: "did:plc:tester".to_string(),
            content_hash: "bafy1".to_string(),
            observed_at_micros: observed,
            record_payload: Some(json!({
                "$type": "app.bsky.feed.post",
                "text": "hi",
                "createdAt": "2024-01-01T00:00:00.000Z"
            })),
        }
    }

    #[tokio::test]
    async fn test_ingestion_stores_and_advances_cursor() {
        let (tx, rx) = mpsc::channel(16);
        let store = Arc::new(SqliteRecordStore::in_memory().unwrap());
        let cursor = Arc::new(AtomicI64::new(0));

        let handle = tokio::spawn(start_pipeline_ingestion(
            rx,
            store.clone(),
            cursor.clone(),
        ));

        tx.send(post_event("at://a/app.bsky.feed.post/1", 100)).await.unwrap();
        tx.send(post_event("at://a/app.bsky.feed.post/2", 200)).await.unwrap();
        drop(tx);

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary, IngestionSummary { stored: 2, dropped: 0 });
        assert_eq!(cursor.load(Ordering::SeqCst), 200);
        assert_eq!(store.count(RecordKind::Content, None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_malformed_event_does_not_poison_stream() {
        let (tx, rx) = mpsc::channel(16);
        let store = Arc::new(SqliteRecordStore::in_memory().unwrap());
        let cursor = Arc::new(AtomicI64::new(0));

        let handle = tokio::spawn(start_pipeline_ingestion(
            rx,
            store.clone(),
            cursor.clone(),
        ));

        let mut bad = post_event("at://a/app.bsky.feed.post/bad", 150);
        bad.kind = "like".to_string();
        tx.send(post_event("at://a/app.bsky.feed.post/1", 100)).await.unwrap();
        tx.send(bad).await.unwrap();
        tx.send(post_event("at://a/app.bsky.feed.post/2", 200)).await.unwrap();
        drop(tx);

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary, IngestionSummary { stored: 2, dropped: 1 });
        assert_eq!(cursor.load(Ordering::SeqCst), 200);
        assert!(store
            .get_record(RecordKind::Content, "at://a/app.bsky.feed.post/bad")
            .await
            .unwrap()
            .is_none());
    }

    /// Store whose writes always fail
    struct BrokenStore;

    #[async_trait]
    impl RecordStore for BrokenStore {
        async fn upsert(&self, _record: &Record) -> PipelineResult<()> {
            Err(PipelineError::StoreUnavailable("disk gone".into()))
        }
        async fn get_record(&self, _: RecordKind, _: &str) -> PipelineResult<Option<Record>> {
            Ok(None)
        }
        async fn count(&self, _: RecordKind, _: Option<i64>) -> PipelineResult<u64> {
            Ok(0)
        }
        async fn count_top_level_content_items(&self, _: Option<i64>) -> PipelineResult<u64> {
            Ok(0)
        }
        async fn count_top_level_items_with_gate_rules(&self, _: Option<i64>) -> PipelineResult<u64> {
            Ok(0)
        }
        async fn count_gates_with_rules(&self, _: Option<i64>) -> PipelineResult<u64> {
            Ok(0)
        }
        async fn sum_facets(&self, _: Option<i64>) -> PipelineResult<crate::pipeline::stats::RuleStats> {
            Ok(Default::default())
        }
        async fn rules_per_gate_histogram(
            &self,
            _: Option<i64>,
        ) -> PipelineResult<crate::pipeline::stats::RulesPerGate> {
            Ok(Default::default())
        }
        async fn top_rule_combinations(
            &self,
            _: usize,
            _: Option<i64>,
        ) -> PipelineResult<Vec<crate::pipeline::stats::RuleCombination>> {
            Ok(Vec::new())
        }
        async fn timestamp_range(&self) -> PipelineResult<Option<(i64, i64)>> {
            Ok(None)
        }
        async fn cumulative_counts(
            &self,
            _: &[i64],
        ) -> PipelineResult<Vec<crate::pipeline::historical::HistoricalPoint>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_store_failure_halts_without_advancing_cursor() {
        let (tx, rx) = mpsc::channel(16);
        let cursor = Arc::new(AtomicI64::new(50));

        tx.send(post_event("at://a/app.bsky.feed.post/1", 100)).await.unwrap();
        tx.send(post_event("at://a/app.bsky.feed.post/2", 200)).await.unwrap();

        let result = start_pipeline_ingestion(rx, Arc::new(BrokenStore), cursor.clone()).await;
        assert!(matches!(result, Err(PipelineError::StoreUnavailable(_))));
        assert_eq!(cursor.load(Ordering::SeqCst), 50);
    }
}
