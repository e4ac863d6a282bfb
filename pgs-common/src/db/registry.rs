//! Sync registry access
//!
//! Idempotent mapping between remote API entities and local WordPress
//! objects, keyed by (item_type, api_id, api_token, procedure_api_id).
//! The registry also powers orphan detection: every row touched during a
//! sync pass carries that pass's session id, and rows left behind on an
//! older session were absent from the latest remote payload.

use crate::db::models::{ItemType, RegistryCounts, RegistryUpsert, SyncRegistryItem, WpObjectType};
use crate::db::now_ts;
use crate::{Error, Result};
use sqlx::SqlitePool;

/// Storage bound for the sync_hash column
const SYNC_HASH_MAX: usize = 32;

/// Storage bound for the last_sync_session column
const SESSION_MAX: usize = 64;

const SELECT_COLUMNS: &str = "id, item_type, api_id, wordpress_id, wordpress_type, api_token, \
     property_id, procedure_api_id, sync_hash, last_synced, last_sync_session, created_at";

/// Insert or update a registry mapping in one atomic statement.
///
/// On conflict with an existing identity the current mapping fields are
/// overwritten; created_at and the identity key itself never change.
/// Concurrent writers race safely because the database resolves the
/// conflict, not a read-then-write in this process.
pub async fn upsert(pool: &SqlitePool, item: &RegistryUpsert) -> Result<()> {
    if item.api_token.trim().is_empty() {
        return Err(Error::InvalidInput("api_token must not be empty".to_string()));
    }
    if item.api_id <= 0 {
        return Err(Error::InvalidInput(format!("invalid api_id: {}", item.api_id)));
    }
    if item.wordpress_id <= 0 {
        return Err(Error::InvalidInput(format!(
            "invalid wordpress_id: {}",
            item.wordpress_id
        )));
    }

    let sync_hash = clip(&item.sync_hash, SYNC_HASH_MAX);
    let session = clip(&item.sync_session, SESSION_MAX);

    sqlx::query(
        r#"
        INSERT INTO sync_registry
            (item_type, api_id, wordpress_id, wordpress_type, api_token, property_id,
             procedure_api_id, sync_hash, last_synced, last_sync_session)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(item_type, api_id, api_token, procedure_api_id) DO UPDATE SET
            wordpress_id = excluded.wordpress_id,
            wordpress_type = excluded.wordpress_type,
            property_id = excluded.property_id,
            sync_hash = excluded.sync_hash,
            last_synced = excluded.last_synced,
            last_sync_session = excluded.last_sync_session
        "#,
    )
    .bind(item.item_type)
    .bind(item.api_id)
    .bind(item.wordpress_id)
    .bind(item.wordpress_type)
    .bind(&item.api_token)
    .bind(item.property_id)
    .bind(item.procedure_api_id.max(0))
    .bind(sync_hash)
    .bind(now_ts())
    .bind(session)
    .execute(pool)
    .await?;

    Ok(())
}

/// Point lookup by identity key; procedure_api_id 0 means "no procedure
/// context"
pub async fn get(
    pool: &SqlitePool,
    item_type: ItemType,
    api_id: i64,
    api_token: &str,
    procedure_api_id: i64,
) -> Result<Option<SyncRegistryItem>> {
    let item = sqlx::query_as::<_, SyncRegistryItem>(&format!(
        r#"
        SELECT {SELECT_COLUMNS} FROM sync_registry
        WHERE item_type = ? AND api_id = ? AND api_token = ? AND procedure_api_id = ?
        "#
    ))
    .bind(item_type)
    .bind(api_id)
    .bind(api_token)
    .bind(procedure_api_id.max(0))
    .fetch_optional(pool)
    .await?;

    Ok(item)
}

/// Enumerate rows the current sync pass did not touch.
///
/// Scoped to one tenant, optionally one item type. Every returned row is
/// a deletion candidate for the caller: the store never removes local
/// objects itself.
pub async fn find_orphans(
    pool: &SqlitePool,
    current_session: &str,
    api_token: &str,
    item_type: Option<ItemType>,
) -> Result<Vec<SyncRegistryItem>> {
    if current_session.trim().is_empty() {
        return Err(Error::InvalidInput("current_session must not be empty".to_string()));
    }
    if api_token.trim().is_empty() {
        return Err(Error::InvalidInput("api_token must not be empty".to_string()));
    }

    let orphans = match item_type {
        Some(item_type) => {
            sqlx::query_as::<_, SyncRegistryItem>(&format!(
                r#"
                SELECT {SELECT_COLUMNS} FROM sync_registry
                WHERE api_token = ? AND last_sync_session != ? AND item_type = ?
                ORDER BY id
                "#
            ))
            .bind(api_token)
            .bind(current_session)
            .bind(item_type)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, SyncRegistryItem>(&format!(
                r#"
                SELECT {SELECT_COLUMNS} FROM sync_registry
                WHERE api_token = ? AND last_sync_session != ?
                ORDER BY id
                "#
            ))
            .bind(api_token)
            .bind(current_session)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(orphans)
}

/// Bulk delete by primary key, returning the number of rows removed.
///
/// Non-positive ids are dropped and duplicates collapse; an effectively
/// empty list is a no-op.
pub async fn delete_by_ids(pool: &SqlitePool, ids: &[i64]) -> Result<u64> {
    let mut ids: Vec<i64> = ids.iter().copied().filter(|id| *id > 0).collect();
    ids.sort_unstable();
    ids.dedup();

    if ids.is_empty() {
        return Ok(0);
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!("DELETE FROM sync_registry WHERE id IN ({placeholders})");

    let mut query = sqlx::query(&sql);
    for id in &ids {
        query = query.bind(id);
    }

    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

/// Remove mappings for a local object deleted outside of sync (an editor
/// trashing a post, for example)
pub async fn delete_by_wordpress_object(
    pool: &SqlitePool,
    wordpress_id: i64,
    wordpress_type: WpObjectType,
) -> Result<u64> {
    if wordpress_id <= 0 {
        return Ok(0);
    }

    let result =
        sqlx::query("DELETE FROM sync_registry WHERE wordpress_id = ? AND wordpress_type = ?")
            .bind(wordpress_id)
            .bind(wordpress_type)
            .execute(pool)
            .await?;

    Ok(result.rows_affected())
}

/// Registry row counts grouped by item type
pub async fn stats_by_type(pool: &SqlitePool) -> Result<RegistryCounts> {
    let rows: Vec<(ItemType, i64)> =
        sqlx::query_as("SELECT item_type, COUNT(*) FROM sync_registry GROUP BY item_type")
            .fetch_all(pool)
            .await?;

    let mut counts = RegistryCounts::default();
    for (item_type, count) in rows {
        match item_type {
            ItemType::Case => counts.cases = count,
            ItemType::Procedure => counts.procedures = count,
            ItemType::Doctor => counts.doctors = count,
        }
        counts.total += count;
    }

    Ok(counts)
}

fn clip(value: &str, max: usize) -> String {
    if value.len() <= max {
        return value.to_string();
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}
