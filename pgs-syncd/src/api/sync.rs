//! Sync trigger and status endpoints

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use pgs_common::db::{sync_log, SyncLogEntry, SyncSource, SyncType};
use pgs_common::Error;
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::engine::{self, ActiveJob, SyncRequest};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub sync_type: SyncType,
    /// Required when sync_type is "single"
    #[serde(default)]
    pub procedure_api_id: Option<i64>,
    /// "manual" (admin UI) or "rest_api" (default). Scheduler-only
    /// sources cannot be requested over HTTP.
    #[serde(default)]
    pub source: Option<SyncSource>,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub accepted: bool,
    pub sync_type: SyncType,
}

/// POST /api/sync
///
/// Starts a sync pass on a background task. Responds 409 when a pass is
/// already running.
pub async fn trigger_sync(
    State(state): State<AppState>,
    Json(body): Json<TriggerRequest>,
) -> Result<(StatusCode, Json<TriggerResponse>), ApiError> {
    let source = match body.source {
        None => SyncSource::RestApi,
        Some(source @ (SyncSource::Manual | SyncSource::RestApi)) => source,
        Some(other) => {
            return Err(Error::InvalidInput(format!(
                "source {other} cannot be requested over HTTP"
            ))
            .into());
        }
    };

    if body.sync_type == SyncType::Single && body.procedure_api_id.is_none() {
        return Err(Error::InvalidInput(
            "single sync requires procedure_api_id".to_string(),
        )
        .into());
    }

    let request = SyncRequest {
        sync_type: body.sync_type,
        source,
        procedure_api_id: body.procedure_api_id,
    };

    match engine::launch(&state, request).await {
        Some(_handle) => Ok((
            StatusCode::ACCEPTED,
            Json(TriggerResponse {
                accepted: true,
                sync_type: body.sync_type,
            }),
        )),
        None => Err(ApiError::Conflict("a sync is already running".to_string())),
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub active: bool,
    pub job: Option<ActiveJob>,
    pub last_run: Option<SyncLogEntry>,
}

/// GET /api/sync/status
///
/// Snapshot of the running job, or the most recent log entry when idle.
pub async fn sync_status(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ApiError> {
    let job = state.jobs.snapshot().await;
    let last_run = if job.is_some() {
        None
    } else {
        sync_log::recent(&state.db, 1).await?.into_iter().next()
    };

    Ok(Json(StatusResponse {
        active: job.is_some(),
        job,
        last_run,
    }))
}
