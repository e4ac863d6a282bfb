//! Database initialization
//!
//! Opens (and creates on first run) the daemon's SQLite database and
//! brings the schema current. Only a failure to obtain the pool itself is
//! fatal; schema setup errors are logged and initialization continues in
//! a degraded state, so callers that care should confirm
//! [`crate::db::schema::table_exists`] before relying on a store.

use crate::db::migrations;
use crate::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{info, warn};

/// Initialize the database connection and ensure the schema is current
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows the HTTP status handlers to read while a sync pass writes
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    // Schema errors degrade rather than abort: the admin surface must
    // still come up and report "not configured" instead of dying here.
    if let Err(e) = migrations::ensure_schema_current(&pool).await {
        warn!("Schema setup failed, continuing degraded: {e}");
    }

    Ok(pool)
}

/// In-memory database with the current schema, for tests and tooling
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    migrations::ensure_schema_current(&pool).await?;
    Ok(pool)
}
