//! pgs-syncd library - Procedure Gallery Sync daemon
//!
//! Pulls the gallery dataset (procedures, cases, doctors) from the remote
//! SaaS API, pushes content into WordPress, and keeps the sync registry
//! and sync log current. Exposes a small HTTP API for manual triggers,
//! status polling, history, and retention cleanup.

use axum::Router;
use pgs_common::config::SyncConfig;
use sqlx::SqlitePool;

pub mod api;
pub mod content;
pub mod engine;
pub mod remote;
pub mod scheduler;

/// Application state shared across HTTP handlers and the scheduler
#[derive(Clone)]
pub struct AppState {
    /// Sync database connection pool
    pub db: SqlitePool,
    /// Daemon configuration
    pub config: SyncConfig,
    /// At-most-one-active-job gate and polling snapshot
    pub jobs: engine::JobTracker,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool, config: SyncConfig) -> Self {
        Self {
            db,
            config,
            jobs: engine::JobTracker::default(),
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/api/sync", post(api::trigger_sync))
        .route("/api/sync/status", get(api::sync_status))
        .route("/api/sync/history", get(api::sync_history))
        .route("/api/sync/stats", get(api::sync_stats))
        .route("/api/sync/cleanup", post(api::cleanup_history))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
