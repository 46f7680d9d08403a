//! HTTP handlers for the statistics API
//!
//! Provides 3 endpoints:
//! - GET /api/stats                 - live statistics snapshot
//! - GET /api/historical?limit=N    - cumulative bucket series
//! - GET /health                    - liveness and version

use crate::pipeline::config::PipelineConfig;
use crate::pipeline::db::RecordStore;
use crate::pipeline::error::PipelineError;
use crate::pipeline::{historical, stats};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub config: Arc<PipelineConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// `limit` stays a string so that junk values fall back to the default
/// instead of rejecting the request
#[derive(Debug, Default, Deserialize)]
pub struct HistoricalParams {
    pub limit: Option<String>,
}

/// Query failure rendered as `500 {"error": "..."}`
pub struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        log::error!("❌ API query failed: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

/// Create the API router
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/api/stats", get(get_stats))
        .route("/api/historical", get(get_historical))
        .route("/health", get(health))
        .with_state(state)
}

/// Resolve the requested bucket count
///
/// Missing, zero or non-numeric values use `default`; numeric values are
/// clamped to `max`.
pub fn resolve_bucket_count(raw: Option<&str>, default: usize, max: usize) -> usize {
    raw.and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|&count| count > 0)
        .unwrap_or(default)
        .min(max)
}

/// GET /api/stats
async fn get_stats(State(state): State<AppState>) -> Result<Json<stats::StatsSnapshot>, ApiError> {
    let snapshot =
        stats::compute_stats(state.store.as_ref(), state.config.top_combinations_limit).await?;
    Ok(Json(snapshot))
}

/// GET /api/historical?limit=N
async fn get_historical(
    State(state): State<AppState>,
    Query(params): Query<HistoricalParams>,
) -> Result<Json<Vec<historical::HistoricalPoint>>, ApiError> {
    let bucket_count = resolve_bucket_count(
        params.limit.as_deref(),
        state.config.historical_default_buckets,
        state.config.historical_max_buckets,
    );

    let series = historical::sample(
        state.store.as_ref(),
        bucket_count,
        state.config.historical_max_buckets,
    )
    .await?;
    Ok(Json(series))
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
