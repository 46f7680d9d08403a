//! Record store trait and its SQLite implementation
//!
//! One table per record kind (see `/sql/`), keyed by URI. Every aggregate
//! query counts only rows whose current revision is a `create`.

use super::classifier::{combination_label, combination_rank};
use super::error::{PipelineError, PipelineResult};
use super::historical::HistoricalPoint;
use super::stats::{RuleCombination, RuleStats, RulesPerGate};
use super::types::{
    ContentItem, Facets, Operation, QuoteGate, Record, RecordKind, ReplyGate,
};
use crate::sqlite_pragma::{apply_memory_pragmas, apply_optimized_pragmas};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Schema files applied in order; `PRAGMA user_version` records progress
const MIGRATIONS: &[(&str, &str)] = &[
    ("01_content_items.sql", include_str!("../../sql/01_content_items.sql")),
    ("02_reply_gates.sql", include_str!("../../sql/02_reply_gates.sql")),
    ("03_quote_gates.sql", include_str!("../../sql/03_quote_gates.sql")),
];

/// Durable, queryable store of the latest revision of every record
///
/// Tables written (see `/sql/` directory):
/// - `content_items` - UPSERT on uri
/// - `reply_gates` - UPSERT on uri
/// - `quote_gates` - UPSERT on uri
///
/// `as_of` bounds are inclusive on `observed_at_us`; `None` means unbounded.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or fully replace the row with the record's URI
    ///
    /// Last write wins by arrival order, never by timestamp.
    async fn upsert(&self, record: &Record) -> PipelineResult<()>;

    /// Current revision of a record, whatever its operation
    async fn get_record(&self, kind: RecordKind, uri: &str) -> PipelineResult<Option<Record>>;

    async fn count(&self, kind: RecordKind, as_of: Option<i64>) -> PipelineResult<u64>;

    async fn count_top_level_content_items(&self, as_of: Option<i64>) -> PipelineResult<u64>;

    /// Distinct top-level posts targeted by at least one gate with rules,
    /// both sides observed at or before `as_of`
    async fn count_top_level_items_with_gate_rules(
        &self,
        as_of: Option<i64>,
    ) -> PipelineResult<u64>;

    async fn count_gates_with_rules(&self, as_of: Option<i64>) -> PipelineResult<u64>;

    async fn sum_facets(&self, as_of: Option<i64>) -> PipelineResult<RuleStats>;

    /// Histogram of specific-rule counts, nobody-can-reply gates excluded
    async fn rules_per_gate_histogram(&self, as_of: Option<i64>) -> PipelineResult<RulesPerGate>;

    /// Most frequent combination labels, count descending, ties in fixed
    /// label order
    async fn top_rule_combinations(
        &self,
        limit: usize,
        as_of: Option<i64>,
    ) -> PipelineResult<Vec<RuleCombination>>;

    /// `(min, max)` observed timestamp across create content items
    async fn timestamp_range(&self) -> PipelineResult<Option<(i64, i64)>>;

    /// One cumulative snapshot per boundary, all read from a single view
    async fn cumulative_counts(&self, boundaries: &[i64]) -> PipelineResult<Vec<HistoricalPoint>>;
}

/// Apply pending schema files from `/sql/`
///
/// Each file uses `IF NOT EXISTS`, so re-running against an existing
/// database is harmless. `user_version` skips files already applied.
pub fn run_schema_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    let applied: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if applied as usize >= MIGRATIONS.len() {
        log::debug!("📊 Schema up to date (user_version={})", applied);
        return Ok(());
    }

    log::info!("🔧 Running schema migrations from version {}", applied);

    let tx = conn.transaction()?;
    for (version, (name, sql)) in MIGRATIONS.iter().enumerate().skip(applied.max(0) as usize) {
        log::info!("   ├─ Executing: {}", name);
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", (version + 1) as i64)?;
    }
    tx.commit()?;

    log::info!("✅ All schema migrations completed successfully");
    Ok(())
}

/// SQLite-backed `RecordStore`
///
/// File databases get a dedicated `query_only` reader so statistics never
/// wait behind the ingestion writer. `:memory:` databases share one
/// connection because a second connection would open a separate database.
pub struct SqliteRecordStore {
    writer: Arc<Mutex<Connection>>,
    reader: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Open (creating if needed) the database at `db_path`
    pub fn open(db_path: &str) -> PipelineResult<Self> {
        if db_path == ":memory:" {
            return Self::in_memory();
        }

        let mut writer = Connection::open(db_path).map_err(store_unavailable)?;
        apply_optimized_pragmas(&writer).map_err(store_unavailable)?;
        run_schema_migrations(&mut writer).map_err(store_unavailable)?;

        let reader = Connection::open(db_path).map_err(store_unavailable)?;
        apply_optimized_pragmas(&reader).map_err(store_unavailable)?;
        reader
            .pragma_update(None, "query_only", true)
            .map_err(store_unavailable)?;

        log::info!("📊 Opened record store at {}", db_path);

        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
            reader: Arc::new(Mutex::new(reader)),
        })
    }

    /// Volatile store for tests and ephemeral runs
    pub fn in_memory() -> PipelineResult<Self> {
        let mut conn = Connection::open_in_memory().map_err(store_unavailable)?;
        apply_memory_pragmas(&conn).map_err(store_unavailable)?;
        run_schema_migrations(&mut conn).map_err(store_unavailable)?;

        let shared = Arc::new(Mutex::new(conn));
        Ok(Self {
            writer: Arc::clone(&shared),
            reader: shared,
        })
    }

    fn writer(&self) -> PipelineResult<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| PipelineError::StoreUnavailable("writer connection poisoned".into()))
    }

    fn reader(&self) -> PipelineResult<MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| PipelineError::QueryFailure("reader connection poisoned".into()))
    }

    fn count_as_of(conn: &Connection, kind: RecordKind, as_of: Option<i64>) -> rusqlite::Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE operation = 'create' AND (?1 IS NULL OR observed_at_us <= ?1)",
            kind.table_name()
        );
        conn.query_row(&sql, params![as_of], |row| row.get(0))
    }

    fn count_top_level_as_of(conn: &Connection, as_of: Option<i64>) -> rusqlite::Result<u64> {
        conn.query_row(
            "SELECT COUNT(*) FROM content_items
             WHERE operation = 'create' AND is_reply = 0
               AND (?1 IS NULL OR observed_at_us <= ?1)",
            params![as_of],
            |row| row.get(0),
        )
    }

    fn count_gated_as_of(conn: &Connection, as_of: Option<i64>) -> rusqlite::Result<u64> {
        conn.query_row(
            "SELECT COUNT(DISTINCT c.uri)
             FROM content_items c
             INNER JOIN reply_gates g ON c.uri = g.target_uri
             WHERE c.operation = 'create' AND c.is_reply = 0
               AND g.operation = 'create' AND g.has_rules = 1
               AND (?1 IS NULL OR (c.observed_at_us <= ?1 AND g.observed_at_us <= ?1))",
            params![as_of],
            |row| row.get(0),
        )
    }
}

fn store_unavailable(err: rusqlite::Error) -> PipelineError {
    PipelineError::StoreUnavailable(err.to_string())
}

fn query_failure(err: rusqlite::Error) -> PipelineError {
    PipelineError::QueryFailure(err.to_string())
}

fn parse_operation(raw: &str) -> rusqlite::Result<Operation> {
    Operation::from_str(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown operation '{}'", raw).into(),
        )
    })
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn upsert(&self, record: &Record) -> PipelineResult<()> {
        let conn = self.writer()?;

        let written = match record {
            Record::Content(item) => conn.execute(
                "INSERT OR REPLACE INTO content_items (
                    uri, content_hash, author_id, text, created_at, is_reply,
                    operation, observed_at_us
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    item.uri,
                    item.content_hash,
                    item.author_id,
                    item.text,
                    item.created_at,
                    item.is_reply,
                    item.operation.as_str(),
                    item.observed_at_micros,
                ],
            ),
            Record::ReplyGate(gate) => conn.execute(
                "INSERT OR REPLACE INTO reply_gates (
                    uri, content_hash, author_id, target_uri,
                    has_rules, has_nobody_can_reply,
                    has_mention_rule, has_following_rule, has_follower_rule, has_list_rule,
                    has_hidden_replies_only, operation, observed_at_us
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    gate.uri,
                    gate.content_hash,
                    gate.author_id,
                    gate.target_uri,
                    gate.facets.has_rules,
                    gate.facets.has_nobody_can_reply,
                    gate.facets.has_mention_rule,
                    gate.facets.has_following_rule,
                    gate.facets.has_follower_rule,
                    gate.facets.has_list_rule,
                    gate.facets.has_hidden_replies_only,
                    gate.operation.as_str(),
                    gate.observed_at_micros,
                ],
            ),
            Record::QuoteGate(gate) => conn.execute(
                "INSERT OR REPLACE INTO quote_gates (
                    uri, content_hash, author_id, target_uri, operation, observed_at_us
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    gate.uri,
                    gate.content_hash,
                    gate.author_id,
                    gate.target_uri,
                    gate.operation.as_str(),
                    gate.observed_at_micros,
                ],
            ),
        };

        written.map_err(store_unavailable)?;
        Ok(())
    }

    async fn get_record(&self, kind: RecordKind, uri: &str) -> PipelineResult<Option<Record>> {
        let conn = self.reader()?;

        let record = match kind {
            RecordKind::Content => conn
                .query_row(
                    "SELECT uri, content_hash, author_id, text, created_at, is_reply,
                            operation, observed_at_us
                     FROM content_items WHERE uri = ?1",
                    params![uri],
                    |row| {
                        Ok(Record::Content(ContentItem {
                            uri: row.get(0)?,
                            content_hash: row.get(1)?,
                            author_id: row.get(2)?,
                            text: row.get(3)?,
                            created_at: row.get(4)?,
                            is_reply: row.get(5)?,
                            operation: parse_operation(&row.get::<_, String>(6)?)?,
                            observed_at_micros: row.get(7)?,
                        }))
                    },
                )
                .optional(),
            RecordKind::ReplyGate => conn
                .query_row(
                    "SELECT uri, content_hash, author_id, target_uri,
                            has_rules, has_nobody_can_reply,
                            has_mention_rule, has_following_rule, has_follower_rule, has_list_rule,
                            has_hidden_replies_only, operation, observed_at_us
                     FROM reply_gates WHERE uri = ?1",
                    params![uri],
                    |row| {
                        Ok(Record::ReplyGate(ReplyGate {
                            uri: row.get(0)?,
                            content_hash: row.get(1)?,
                            author_id: row.get(2)?,
                            target_uri: row.get(3)?,
                            facets: Facets {
                                has_rules: row.get(4)?,
                                has_nobody_can_reply: row.get(5)?,
                                has_mention_rule: row.get(6)?,
                                has_following_rule: row.get(7)?,
                                has_follower_rule: row.get(8)?,
                                has_list_rule: row.get(9)?,
                                has_hidden_replies_only: row.get(10)?,
                            },
                            operation: parse_operation(&row.get::<_, String>(11)?)?,
                            observed_at_micros: row.get(12)?,
                        }))
                    },
                )
                .optional(),
            RecordKind::QuoteGate => conn
                .query_row(
                    "SELECT uri, content_hash, author_id, target_uri, operation, observed_at_us
                     FROM quote_gates WHERE uri = ?1",
                    params![uri],
                    |row| {
                        Ok(Record::QuoteGate(QuoteGate {
                            uri: row.get(0)?,
                            content_hash: row.get(1)?,
                            author_id: row.get(2)?,
                            target_uri: row.get(3)?,
                            operation: parse_operation(&row.get::<_, String>(4)?)?,
                            observed_at_micros: row.get(5)?,
                        }))
                    },
                )
                .optional(),
        };

        record.map_err(query_failure)
    }

    async fn count(&self, kind: RecordKind, as_of: Option<i64>) -> PipelineResult<u64> {
        let conn = self.reader()?;
        Self::count_as_of(&conn, kind, as_of).map_err(query_failure)
    }

    async fn count_top_level_content_items(&self, as_of: Option<i64>) -> PipelineResult<u64> {
        let conn = self.reader()?;
        Self::count_top_level_as_of(&conn, as_of).map_err(query_failure)
    }

    async fn count_top_level_items_with_gate_rules(
        &self,
        as_of: Option<i64>,
    ) -> PipelineResult<u64> {
        let conn = self.reader()?;
        Self::count_gated_as_of(&conn, as_of).map_err(query_failure)
    }

    async fn count_gates_with_rules(&self, as_of: Option<i64>) -> PipelineResult<u64> {
        let conn = self.reader()?;
        conn.query_row(
            "SELECT COUNT(*) FROM reply_gates
             WHERE operation = 'create' AND has_rules = 1
               AND (?1 IS NULL OR observed_at_us <= ?1)",
            params![as_of],
            |row| row.get(0),
        )
        .map_err(query_failure)
    }

    async fn sum_facets(&self, as_of: Option<i64>) -> PipelineResult<RuleStats> {
        let conn = self.reader()?;
        conn.query_row(
            "SELECT
                COALESCE(SUM(has_nobody_can_reply), 0),
                COALESCE(SUM(has_mention_rule), 0),
                COALESCE(SUM(has_following_rule), 0),
                COALESCE(SUM(has_follower_rule), 0),
                COALESCE(SUM(has_list_rule), 0),
                COALESCE(SUM(has_hidden_replies_only), 0)
             FROM reply_gates
             WHERE operation = 'create' AND (?1 IS NULL OR observed_at_us <= ?1)",
            params![as_of],
            |row| {
                Ok(RuleStats {
                    nobody_can_reply: row.get(0)?,
                    mention_rule: row.get(1)?,
                    following_rule: row.get(2)?,
                    follower_rule: row.get(3)?,
                    list_rule: row.get(4)?,
                    hidden_posts_only: row.get(5)?,
                })
            },
        )
        .map_err(query_failure)
    }

    async fn rules_per_gate_histogram(&self, as_of: Option<i64>) -> PipelineResult<RulesPerGate> {
        let conn = self.reader()?;
        let mut stmt = conn
            .prepare(
                "SELECT has_mention_rule + has_following_rule + has_follower_rule + has_list_rule AS n,
                        COUNT(*)
                 FROM reply_gates
                 WHERE operation = 'create' AND has_nobody_can_reply = 0
                   AND (?1 IS NULL OR observed_at_us <= ?1)
                 GROUP BY n",
            )
            .map_err(query_failure)?;

        let rows = stmt
            .query_map(params![as_of], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, u64>(1)?))
            })
            .map_err(query_failure)?;

        let mut histogram = RulesPerGate::default();
        for row in rows {
            let (rule_count, gates) = row.map_err(query_failure)?;
            match rule_count {
                0 => histogram.zero = gates,
                1 => histogram.one = gates,
                2 => histogram.two = gates,
                3 => histogram.three = gates,
                4 => histogram.four = gates,
                other => log::warn!("⚠️  Gate row with {} rule facets ignored", other),
            }
        }

        Ok(histogram)
    }

    async fn top_rule_combinations(
        &self,
        limit: usize,
        as_of: Option<i64>,
    ) -> PipelineResult<Vec<RuleCombination>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.reader()?;
        let mut stmt = conn
            .prepare(
                "SELECT has_nobody_can_reply, has_mention_rule, has_following_rule,
                        has_follower_rule, has_list_rule, COUNT(*)
                 FROM reply_gates
                 WHERE operation = 'create' AND (?1 IS NULL OR observed_at_us <= ?1)
                 GROUP BY has_nobody_can_reply, has_mention_rule, has_following_rule,
                          has_follower_rule, has_list_rule",
            )
            .map_err(query_failure)?;

        let rows = stmt
            .query_map(params![as_of], |row| {
                let facets = Facets {
                    has_nobody_can_reply: row.get(0)?,
                    has_mention_rule: row.get(1)?,
                    has_following_rule: row.get(2)?,
                    has_follower_rule: row.get(3)?,
                    has_list_rule: row.get(4)?,
                    ..Facets::default()
                };
                Ok((facets, row.get::<_, u64>(5)?))
            })
            .map_err(query_failure)?;

        // Distinct flag groups can share a label (nobody-can-reply ignores
        // the rule flags), so merge by label before ranking.
        let mut by_label: HashMap<String, (u64, (u8, [bool; 4]))> = HashMap::new();
        for row in rows {
            let (facets, count) = row.map_err(query_failure)?;
            let entry = by_label
                .entry(combination_label(&facets))
                .or_insert((0, combination_rank(&facets)));
            entry.0 += count;
        }

        let mut ranked: Vec<_> = by_label.into_iter().collect();
        ranked.sort_by(|(_, (count_a, rank_a)), (_, (count_b, rank_b))| {
            count_b.cmp(count_a).then(rank_a.cmp(rank_b))
        });
        ranked.truncate(limit);

        Ok(ranked
            .into_iter()
            .map(|(combination, (count, _))| RuleCombination { combination, count })
            .collect())
    }

    async fn timestamp_range(&self) -> PipelineResult<Option<(i64, i64)>> {
        let conn = self.reader()?;
        let (min, max): (Option<i64>, Option<i64>) = conn
            .query_row(
                "SELECT MIN(observed_at_us), MAX(observed_at_us)
                 FROM content_items WHERE operation = 'create'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(query_failure)?;

        Ok(min.zip(max))
    }

    async fn cumulative_counts(&self, boundaries: &[i64]) -> PipelineResult<Vec<HistoricalPoint>> {
        let mut conn = self.reader()?;
        // Deferred read transaction: every boundary sees the same snapshot
        let tx = conn.transaction().map_err(query_failure)?;

        let mut points = Vec::with_capacity(boundaries.len());
        for &boundary in boundaries {
            let as_of = Some(boundary);
            points.push(HistoricalPoint {
                timestamp: boundary,
                posts: Self::count_as_of(&tx, RecordKind::Content, as_of).map_err(query_failure)?,
                threadgates: Self::count_as_of(&tx, RecordKind::ReplyGate, as_of)
                    .map_err(query_failure)?,
                postgates: Self::count_as_of(&tx, RecordKind::QuoteGate, as_of)
                    .map_err(query_failure)?,
                top_level_posts: Self::count_top_level_as_of(&tx, as_of).map_err(query_failure)?,
                top_level_posts_with_thread_gate: Self::count_gated_as_of(&tx, as_of)
                    .map_err(query_failure)?,
            });
        }

        tx.commit().map_err(query_failure)?;
        Ok(points)
    }
}
