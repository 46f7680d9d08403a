//! # Content/Gate Ingestion Pipeline
//!
//! Ingests post, threadgate and postgate commits, keeps the latest revision
//! of each record in SQLite, and answers aggregate questions about how reply
//! gating is used.
//!
//! ## Data flow
//!
//! 1. The stream client forwards `IncomingEvent`s over an mpsc channel
//! 2. `normalizer` maps each event to a typed `Record`
//!    (`classifier` derives reply-gate facets)
//! 3. `db::RecordStore::upsert` replaces the row keyed by URI
//! 4. `stats` and `historical` query the store on demand
//!
//! Only rows whose current revision is a `create` count toward aggregates.
//! An update or delete replaces the row and so removes it from every count.
//!
//! ## Module Organization
//!
//! - `types` - Records, facets and the raw input event
//! - `error` - `PipelineError` taxonomy
//! - `classifier` - Allow list to facets, combination labels
//! - `normalizer` - Event payload parsing
//! - `db` - `RecordStore` trait and SQLite implementation
//! - `stats` - Live statistics snapshot
//! - `historical` - Cumulative bucket sampling
//! - `ingestion` - Channel consumer
//! - `config` - Environment configuration

pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod historical;
pub mod ingestion;
pub mod normalizer;
pub mod stats;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use db::{RecordStore, SqliteRecordStore};
pub use error::{PipelineError, PipelineResult};
pub use historical::HistoricalPoint;
pub use ingestion::{start_pipeline_ingestion, IngestionSummary};
pub use stats::StatsSnapshot;
pub use types::{ContentItem, Facets, IncomingEvent, Operation, QuoteGate, Record, RecordKind, ReplyGate, RuleTag};
