//! Pipeline configuration from environment variables

use super::historical::{DEFAULT_BUCKETS, MAX_BUCKETS};
use super::stats::DEFAULT_TOP_COMBINATIONS;
use std::env;
use std::str::FromStr;

/// Configuration for the ingestion pipeline and stats API
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Path to SQLite database file (`:memory:` for a volatile store)
    pub db_path: String,

    /// Path to the resume cursor file
    pub cursor_path: String,

    /// HTTP bind address
    pub bind_addr: String,

    /// HTTP port
    pub port: u16,

    /// Channel buffer size between stream client and ingestion (events)
    pub channel_buffer: usize,

    /// Bucket count used when `/api/historical` gets no usable `limit`
    pub historical_default_buckets: usize,

    /// Upper clamp for `/api/historical?limit`
    pub historical_max_buckets: usize,

    /// Number of rule combinations reported by `/api/stats`
    pub top_combinations_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            db_path: ":memory:".to_string(),
            cursor_path: "cursor.txt".to_string(),
            bind_addr: "0.0.0.0".to_string(),
            port: 3000,
            channel_buffer: 10_000,
            historical_default_buckets: DEFAULT_BUCKETS,
            historical_max_buckets: MAX_BUCKETS,
            top_combinations_limit: DEFAULT_TOP_COMBINATIONS,
        }
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `GATEWATCH_DB_PATH` (default: :memory:)
    /// - `GATEWATCH_CURSOR_PATH` (default: cursor.txt)
    /// - `GATEWATCH_BIND_ADDR` (default: 0.0.0.0)
    /// - `PORT` (default: 3000)
    /// - `STREAMER_CHANNEL_BUFFER` (default: 10000)
    /// - `HISTORICAL_DEFAULT_BUCKETS` (default: 20)
    /// - `HISTORICAL_MAX_BUCKETS` (default: 500)
    /// - `TOP_COMBINATIONS_LIMIT` (default: 10)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let historical_max_buckets =
            parse_or("HISTORICAL_MAX_BUCKETS", defaults.historical_max_buckets).max(1);

        Self {
            db_path: env::var("GATEWATCH_DB_PATH").unwrap_or(defaults.db_path),
            cursor_path: env::var("GATEWATCH_CURSOR_PATH").unwrap_or(defaults.cursor_path),
            bind_addr: env::var("GATEWATCH_BIND_ADDR").unwrap_or(defaults.bind_addr),
            port: parse_or("PORT", defaults.port),
            channel_buffer: parse_or("STREAMER_CHANNEL_BUFFER", defaults.channel_buffer).max(1),
            historical_default_buckets: parse_or(
                "HISTORICAL_DEFAULT_BUCKETS",
                defaults.historical_default_buckets,
            )
            .min(historical_max_buckets),
            historical_max_buckets,
            top_combinations_limit: parse_or(
                "TOP_COMBINATIONS_LIMIT",
                defaults.top_combinations_limit,
            ),
        }
    }

    /// `bind_addr:port`
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}
