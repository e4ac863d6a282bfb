//! Versioned schema migrations
//!
//! Upgrades existing databases in place without data loss. The installed
//! version is a semantic-version string persisted in the settings table;
//! migrations whose target version exceeds it run in ascending order, then
//! the idempotent DDL in [`crate::db::schema`] is re-issued and the new
//! version is persisted.
//!
//! A fresh database never plays migrations in any meaningful way: every
//! step probes for the table it touches and skips when the table does not
//! exist yet, so a first run falls through to plain current-version
//! `CREATE TABLE`.
//!
//! # Migration guidelines
//!
//! 1. Never modify an existing migration once released
//! 2. Add a new version for each schema change
//! 3. Prefer ALTER TABLE over DROP/CREATE to preserve data
//! 4. Every step must tolerate re-running after an interrupted upgrade

use crate::db::{schema, settings};
use crate::Result;
use sqlx::SqlitePool;
use std::cmp::Ordering;
use tracing::{info, warn};

/// Current schema version
///
/// Increment when adding a migration.
pub const DB_VERSION: &str = "1.3.0";

/// Settings key holding the installed schema version
const VERSION_KEY: &str = "schema_version";

/// Session marker written to registry rows copied from the legacy table
const MIGRATED_SESSION: &str = "migrated";

/// Compare two dotted version strings numerically component by component.
///
/// Missing components count as zero, so "1.2" == "1.2.0".
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.split('.')
            .map(|part| part.trim().parse::<u64>().unwrap_or(0))
            .collect()
    };
    let (a, b) = (parse(a), parse(b));
    let len = a.len().max(b.len());

    for i in 0..len {
        let (x, y) = (
            a.get(i).copied().unwrap_or(0),
            b.get(i).copied().unwrap_or(0),
        );
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Read the installed schema version, "0.0.0" when unrecorded
pub async fn installed_version(pool: &SqlitePool) -> Result<String> {
    if !schema::table_exists(pool, "settings").await? {
        return Ok("0.0.0".to_string());
    }

    Ok(settings::get_setting(pool, VERSION_KEY)
        .await?
        .unwrap_or_else(|| "0.0.0".to_string()))
}

async fn set_installed_version(pool: &SqlitePool, version: &str) -> Result<()> {
    settings::set_setting(pool, VERSION_KEY, version).await
}

/// Bring the schema up to [`DB_VERSION`].
///
/// Safe to call on every daemon start. An up-to-date database returns
/// after the version check; anything older runs the pending migrations,
/// re-issues the idempotent CREATE TABLE statements, and persists the new
/// version.
pub async fn ensure_schema_current(pool: &SqlitePool) -> Result<()> {
    let installed = installed_version(pool).await?;

    match compare_versions(&installed, DB_VERSION) {
        Ordering::Equal => {
            info!("Database schema is up to date (v{installed})");
            return Ok(());
        }
        Ordering::Greater => {
            warn!(
                "Database schema version ({installed}) is newer than code version ({DB_VERSION})"
            );
            warn!("This may indicate a downgrade. Leaving the schema untouched.");
            return Ok(());
        }
        Ordering::Less => {}
    }

    info!("Upgrading database schema: v{installed} -> v{DB_VERSION}");

    if compare_versions(&installed, "1.1.0") == Ordering::Less {
        migrate_1_1_0(pool).await?;
        info!("✓ Migration 1.1.0 completed");
    }
    if compare_versions(&installed, "1.2.0") == Ordering::Less {
        migrate_1_2_0(pool).await?;
        info!("✓ Migration 1.2.0 completed");
    }
    if compare_versions(&installed, "1.3.0") == Ordering::Less {
        migrate_1_3_0(pool).await?;
        info!("✓ Migration 1.3.0 completed");
    }

    schema::create_all_tables(pool).await?;
    set_installed_version(pool, DB_VERSION).await?;

    info!("Database schema now at v{DB_VERSION}");
    Ok(())
}

async fn column_exists(pool: &SqlitePool, table: &str, column: &str) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM pragma_table_info('{table}') WHERE name = ?"
        ))
        .bind(column)
        .fetch_one(pool)
        .await?;

    Ok(count > 0)
}

/// Migration 1.1.0: add the sync_source column to sync_log
///
/// Early installs recorded only what happened, not what triggered it.
async fn migrate_1_1_0(pool: &SqlitePool) -> Result<()> {
    info!("Running migration 1.1.0: add sync_source to sync_log");

    if !schema::table_exists(pool, "sync_log").await? {
        info!("  sync_log does not exist yet - skipping");
        return Ok(());
    }

    if column_exists(pool, "sync_log", "sync_source").await? {
        info!("  sync_source column already exists - skipping");
        return Ok(());
    }

    // Tolerate the duplicate-column error in case two daemon instances
    // initialize concurrently against the same database file.
    match sqlx::query("ALTER TABLE sync_log ADD COLUMN sync_source TEXT NOT NULL DEFAULT 'manual'")
        .execute(pool)
        .await
    {
        Ok(_) => {}
        Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => {
            info!("  sync_source added by concurrent instance - skipping");
        }
        Err(e) => return Err(e.into()),
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sync_log_source ON sync_log(sync_source)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Migration 1.2.0: replace the legacy case_map table with the unified
/// sync_registry
///
/// case_map only tracked cases. Every row is copied into sync_registry
/// with item_type 'case' and the `migrated` session marker, then the old
/// table is dropped. The copy uses INSERT OR IGNORE and the drop happens
/// last, so a crash mid-upgrade loses nothing and re-running finishes the
/// job.
async fn migrate_1_2_0(pool: &SqlitePool) -> Result<()> {
    info!("Running migration 1.2.0: unify case_map into sync_registry");

    if !schema::table_exists(pool, "case_map").await? {
        info!("  case_map does not exist - skipping");
        return Ok(());
    }

    schema::create_sync_registry_table(pool).await?;

    let copied = sqlx::query(
        r#"
        INSERT OR IGNORE INTO sync_registry
            (item_type, api_id, wordpress_id, wordpress_type, api_token, property_id,
             procedure_api_id, sync_hash, last_synced, last_sync_session, created_at)
        SELECT 'case', api_case_id, post_id, 'post', api_token, property_id,
               0, '', COALESCE(synced_at, CURRENT_TIMESTAMP), ?, COALESCE(created_at, CURRENT_TIMESTAMP)
        FROM case_map
        "#,
    )
    .bind(MIGRATED_SESSION)
    .execute(pool)
    .await?;

    info!("  Copied {} case mapping(s) into sync_registry", copied.rows_affected());

    sqlx::query("DROP TABLE case_map").execute(pool).await?;
    info!("  Dropped legacy case_map table");

    Ok(())
}

/// Migration 1.3.0: add procedure_api_id to the registry identity
///
/// Case api_ids are only unique within a procedure on some remote
/// properties, so the identity key gains the procedure context and the
/// unique index is rebuilt to include it.
async fn migrate_1_3_0(pool: &SqlitePool) -> Result<()> {
    info!("Running migration 1.3.0: add procedure_api_id to sync_registry identity");

    if !schema::table_exists(pool, "sync_registry").await? {
        info!("  sync_registry does not exist yet - skipping");
        return Ok(());
    }

    if !column_exists(pool, "sync_registry", "procedure_api_id").await? {
        match sqlx::query(
            "ALTER TABLE sync_registry ADD COLUMN procedure_api_id INTEGER NOT NULL DEFAULT 0",
        )
        .execute(pool)
        .await
        {
            Ok(_) => info!("  Added procedure_api_id column"),
            Err(sqlx::Error::Database(db_err))
                if db_err.message().contains("duplicate column") =>
            {
                info!("  procedure_api_id added by concurrent instance - skipping");
            }
            Err(e) => return Err(e.into()),
        }
    }

    // Rebuild the identity index with the new column. The old three-column
    // index used the same name, so drop-then-create covers both shapes.
    sqlx::query("DROP INDEX IF EXISTS idx_sync_registry_identity")
        .execute(pool)
        .await?;
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX idx_sync_registry_identity
            ON sync_registry(item_type, api_id, api_token, procedure_api_id)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
