//! Idempotent DDL for the sync tables
//!
//! Every statement here is safe to re-issue on an up-to-date database.
//! Structural changes to existing installs belong in [`crate::db::migrations`],
//! never here.

use crate::Result;
use sqlx::SqlitePool;

/// Check whether a table exists.
///
/// Schema setup degrades rather than aborting, so callers probe here
/// before operations that assume the tables are present.
pub async fn table_exists(pool: &SqlitePool, name: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name=?
        )
        "#,
    )
    .bind(name)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Create the settings table
///
/// Key-value store for daemon-wide persisted state: the installed schema
/// version and the staged-sync session marker live here.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the sync_log table
///
/// One row per sync run. Rows are created in `started` state and updated
/// exactly once more when the run completes or fails.
pub async fn create_sync_log_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sync_type TEXT NOT NULL CHECK (sync_type IN ('full', 'partial', 'single', 'stage_1', 'stage_2', 'stage_3')),
            sync_status TEXT NOT NULL DEFAULT 'started' CHECK (sync_status IN ('started', 'completed', 'failed')),
            sync_source TEXT NOT NULL DEFAULT 'manual' CHECK (sync_source IN ('manual', 'automatic', 'cron', 'rest_api')),
            items_processed INTEGER NOT NULL DEFAULT 0 CHECK (items_processed >= 0),
            items_failed INTEGER NOT NULL DEFAULT 0 CHECK (items_failed >= 0),
            error_messages TEXT,
            started_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            completed_at TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sync_log_status ON sync_log(sync_status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sync_log_started_at ON sync_log(started_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sync_log_source ON sync_log(sync_source)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the sync_registry table
///
/// Maps one remote entity identity to one local WordPress object. The
/// identity key (item_type, api_id, api_token, procedure_api_id) is a
/// named unique index rather than a table constraint so migrations can
/// rebuild it.
pub async fn create_sync_registry_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_registry (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            item_type TEXT NOT NULL CHECK (item_type IN ('case', 'procedure', 'doctor')),
            api_id INTEGER NOT NULL CHECK (api_id > 0),
            wordpress_id INTEGER NOT NULL CHECK (wordpress_id > 0),
            wordpress_type TEXT NOT NULL DEFAULT 'post' CHECK (wordpress_type IN ('post', 'term')),
            api_token TEXT NOT NULL,
            property_id INTEGER NOT NULL DEFAULT 0,
            procedure_api_id INTEGER NOT NULL DEFAULT 0,
            sync_hash TEXT NOT NULL DEFAULT '',
            last_synced TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            last_sync_session TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_sync_registry_identity
            ON sync_registry(item_type, api_id, api_token, procedure_api_id)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sync_registry_wp ON sync_registry(wordpress_id, wordpress_type)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sync_registry_session ON sync_registry(last_sync_session)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sync_registry_type ON sync_registry(item_type)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create all current-version tables (idempotent)
pub async fn create_all_tables(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_sync_log_table(pool).await?;
    create_sync_registry_table(pool).await?;
    Ok(())
}
