//! Sync history, statistics, and retention cleanup endpoints

use axum::extract::{Query, State};
use axum::Json;
use pgs_common::db::{registry, sync_log, RegistryCounts, SyncLogEntry, SyncStats};
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    20
}

/// GET /api/sync/history?limit=N
///
/// Most recent sync runs, newest first. The store clamps the limit.
pub async fn sync_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<SyncLogEntry>>, ApiError> {
    let entries = sync_log::recent(&state.db, query.limit).await?;
    Ok(Json(entries))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub runs: SyncStats,
    pub registry: RegistryCounts,
}

/// GET /api/sync/stats
pub async fn sync_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let runs = sync_log::stats(&state.db).await?;
    let registry = registry::stats_by_type(&state.db).await?;
    Ok(Json(StatsResponse { runs, registry }))
}

#[derive(Debug, Deserialize)]
pub struct CleanupRequest {
    pub days: u32,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub deleted: u64,
}

/// POST /api/sync/cleanup
///
/// Deletes sync log entries older than the given retention window.
pub async fn cleanup_history(
    State(state): State<AppState>,
    Json(body): Json<CleanupRequest>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let deleted = sync_log::cleanup_older_than(&state.db, body.days).await?;
    Ok(Json(CleanupResponse { deleted }))
}
