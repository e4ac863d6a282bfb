//! Sync log access
//!
//! Records discrete sync runs and serves history, aggregate statistics,
//! and retention cleanup. A run is inserted in `started` state and
//! updated exactly once more when it completes or fails; retention
//! cleanup is the only path that deletes rows.

use crate::db::models::{SyncLogEntry, SyncSource, SyncStats, SyncStatus, SyncType};
use crate::db::{fmt_ts, now_ts};
use crate::{Error, Result};
use chrono::{Duration, Utc};
use sqlx::SqlitePool;

/// Storage bound for the error_messages column
const ERROR_TEXT_MAX: usize = 65535;

/// History fetches are capped at this many entries
const RECENT_MAX: u32 = 100;

/// Retention window bounds in days
const RETENTION_MIN_DAYS: u32 = 1;
const RETENTION_MAX_DAYS: u32 = 365;

const SELECT_COLUMNS: &str = "id, sync_type, sync_status, sync_source, items_processed, \
     items_failed, error_messages, started_at, completed_at";

/// Record the start of a sync run, returning the new log id
pub async fn start(pool: &SqlitePool, sync_type: SyncType, source: SyncSource) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO sync_log (sync_type, sync_status, sync_source, started_at)
        VALUES (?, 'started', ?, ?)
        "#,
    )
    .bind(sync_type)
    .bind(source)
    .bind(now_ts())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Record the outcome of a sync run.
///
/// `status` must be a terminal state; error text is truncated to the
/// storage bound. Finishing an unknown log id is reported as NotFound.
pub async fn finish(
    pool: &SqlitePool,
    log_id: i64,
    status: SyncStatus,
    items_processed: u32,
    items_failed: u32,
    error_messages: Option<&str>,
) -> Result<()> {
    if status == SyncStatus::Started {
        return Err(Error::InvalidInput(
            "finish requires a terminal status (completed or failed)".to_string(),
        ));
    }
    if log_id <= 0 {
        return Err(Error::InvalidInput(format!("invalid log id: {log_id}")));
    }

    let errors = error_messages.map(truncate_error_text);

    let result = sqlx::query(
        r#"
        UPDATE sync_log
        SET sync_status = ?, items_processed = ?, items_failed = ?,
            error_messages = ?, completed_at = ?
        WHERE id = ?
        "#,
    )
    .bind(status)
    .bind(items_processed as i64)
    .bind(items_failed as i64)
    .bind(errors)
    .bind(now_ts())
    .bind(log_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("sync log entry {log_id}")));
    }
    Ok(())
}

/// Fetch the most recent runs, newest first.
///
/// The limit is clamped to 1..=100 rather than erroring.
pub async fn recent(pool: &SqlitePool, limit: u32) -> Result<Vec<SyncLogEntry>> {
    let limit = limit.clamp(1, RECENT_MAX);

    let entries = sqlx::query_as::<_, SyncLogEntry>(&format!(
        "SELECT {SELECT_COLUMNS} FROM sync_log ORDER BY started_at DESC, id DESC LIMIT ?"
    ))
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    Ok(entries)
}

/// Aggregate history statistics, computed fresh on every call
pub async fn stats(pool: &SqlitePool) -> Result<SyncStats> {
    let (total_syncs, successful_syncs, failed_syncs, last_sync): (
        i64,
        i64,
        i64,
        Option<chrono::DateTime<Utc>>,
    ) = sqlx::query_as(
        r#"
        SELECT COUNT(*),
               COALESCE(SUM(sync_status = 'completed'), 0),
               COALESCE(SUM(sync_status = 'failed'), 0),
               MAX(started_at)
        FROM sync_log
        "#,
    )
    .fetch_one(pool)
    .await?;

    let total_cases: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sync_registry WHERE item_type = 'case'")
            .fetch_one(pool)
            .await?;

    Ok(SyncStats {
        total_syncs,
        successful_syncs,
        failed_syncs,
        total_cases,
        last_sync,
    })
}

/// Delete runs that started more than `days` ago, returning the count.
///
/// `days` is clamped to 1..=365 rather than erroring.
pub async fn cleanup_older_than(pool: &SqlitePool, days: u32) -> Result<u64> {
    let days = days.clamp(RETENTION_MIN_DAYS, RETENTION_MAX_DAYS);
    let cutoff = fmt_ts(Utc::now() - Duration::days(days as i64));

    let result = sqlx::query("DELETE FROM sync_log WHERE started_at < ?")
        .bind(cutoff)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

fn truncate_error_text(text: &str) -> String {
    if text.len() <= ERROR_TEXT_MAX {
        return text.to_string();
    }
    let mut end = ERROR_TEXT_MAX;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
