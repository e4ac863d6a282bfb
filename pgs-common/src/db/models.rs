//! Database models and closed enumerations
//!
//! The closed string sets the sync tables store (sync type/status/source,
//! item type, local object type) are proper enums: invalid values cannot
//! reach a query, and parsing happens once at the API boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of sync pass recorded in the sync log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SyncType {
    Full,
    Partial,
    Single,
    #[serde(rename = "stage_1")]
    #[sqlx(rename = "stage_1")]
    Stage1,
    #[serde(rename = "stage_2")]
    #[sqlx(rename = "stage_2")]
    Stage2,
    #[serde(rename = "stage_3")]
    #[sqlx(rename = "stage_3")]
    Stage3,
}

impl SyncType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncType::Full => "full",
            SyncType::Partial => "partial",
            SyncType::Single => "single",
            SyncType::Stage1 => "stage_1",
            SyncType::Stage2 => "stage_2",
            SyncType::Stage3 => "stage_3",
        }
    }
}

impl FromStr for SyncType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(SyncType::Full),
            "partial" => Ok(SyncType::Partial),
            "single" => Ok(SyncType::Single),
            "stage_1" => Ok(SyncType::Stage1),
            "stage_2" => Ok(SyncType::Stage2),
            "stage_3" => Ok(SyncType::Stage3),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown sync type: {other}"
            ))),
        }
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a sync log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SyncStatus {
    Started,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Started => "started",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What triggered a sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SyncSource {
    Manual,
    Automatic,
    Cron,
    RestApi,
}

impl SyncSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncSource::Manual => "manual",
            SyncSource::Automatic => "automatic",
            SyncSource::Cron => "cron",
            SyncSource::RestApi => "rest_api",
        }
    }
}

impl FromStr for SyncSource {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(SyncSource::Manual),
            "automatic" => Ok(SyncSource::Automatic),
            "cron" => Ok(SyncSource::Cron),
            "rest_api" => Ok(SyncSource::RestApi),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown sync source: {other}"
            ))),
        }
    }
}

impl fmt::Display for SyncSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of remote entity tracked by the sync registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ItemType {
    Case,
    Procedure,
    Doctor,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Case => "case",
            ItemType::Procedure => "procedure",
            ItemType::Doctor => "doctor",
        }
    }
}

impl FromStr for ItemType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "case" => Ok(ItemType::Case),
            "procedure" => Ok(ItemType::Procedure),
            "doctor" => Ok(ItemType::Doctor),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown item type: {other}"
            ))),
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of local WordPress object a registry row maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum WpObjectType {
    Post,
    Term,
}

impl WpObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WpObjectType::Post => "post",
            WpObjectType::Term => "term",
        }
    }
}

impl fmt::Display for WpObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded sync run
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SyncLogEntry {
    pub id: i64,
    pub sync_type: SyncType,
    pub sync_status: SyncStatus,
    pub sync_source: SyncSource,
    pub items_processed: i64,
    pub items_failed: i64,
    pub error_messages: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One remote-entity-to-local-object mapping
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SyncRegistryItem {
    pub id: i64,
    pub item_type: ItemType,
    pub api_id: i64,
    pub wordpress_id: i64,
    pub wordpress_type: WpObjectType,
    pub api_token: String,
    pub property_id: i64,
    pub procedure_api_id: i64,
    pub sync_hash: String,
    pub last_synced: DateTime<Utc>,
    pub last_sync_session: String,
    pub created_at: DateTime<Utc>,
}

/// Aggregate sync history statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStats {
    pub total_syncs: i64,
    pub successful_syncs: i64,
    pub failed_syncs: i64,
    pub total_cases: i64,
    pub last_sync: Option<DateTime<Utc>>,
}

/// Registry row counts grouped by item type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryCounts {
    pub cases: i64,
    pub procedures: i64,
    pub doctors: i64,
    pub total: i64,
}

/// Input to a registry upsert.
///
/// `procedure_api_id` stays 0 for entities that have no procedure context;
/// it disambiguates case identity under a procedure.
#[derive(Debug, Clone)]
pub struct RegistryUpsert {
    pub item_type: ItemType,
    pub api_id: i64,
    pub wordpress_id: i64,
    pub wordpress_type: WpObjectType,
    pub api_token: String,
    pub property_id: i64,
    pub procedure_api_id: i64,
    pub sync_hash: String,
    pub sync_session: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_type_round_trips() {
        for s in ["full", "partial", "single", "stage_1", "stage_2", "stage_3"] {
            let parsed: SyncType = s.parse().unwrap();
            assert_eq!(parsed.as_str(), s);
        }
    }

    #[test]
    fn bogus_sync_type_rejected() {
        assert!("bogus_type".parse::<SyncType>().is_err());
        assert!("".parse::<SyncType>().is_err());
        assert!("FULL".parse::<SyncType>().is_err());
    }

    #[test]
    fn sync_source_round_trips() {
        for s in ["manual", "automatic", "cron", "rest_api"] {
            let parsed: SyncSource = s.parse().unwrap();
            assert_eq!(parsed.as_str(), s);
        }
        assert!("webhook".parse::<SyncSource>().is_err());
    }

    #[test]
    fn item_type_round_trips() {
        for s in ["case", "procedure", "doctor"] {
            let parsed: ItemType = s.parse().unwrap();
            assert_eq!(parsed.as_str(), s);
        }
        assert!("page".parse::<ItemType>().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&SyncType::Stage1).unwrap();
        assert_eq!(json, "\"stage_1\"");
        let json = serde_json::to_string(&SyncSource::RestApi).unwrap();
        assert_eq!(json, "\"rest_api\"");
    }
}
