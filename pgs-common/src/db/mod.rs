//! Sync database layer: schema management, sync log, sync registry

pub mod init;
pub mod migrations;
pub mod models;
pub mod registry;
pub mod schema;
pub mod settings;
pub mod sync_log;

pub use init::*;
pub use models::*;

use chrono::{DateTime, Utc};

/// Format a timestamp the way SQLite's CURRENT_TIMESTAMP does.
///
/// All datetime columns store UTC text in this one format so that plain
/// string comparison and MIN/MAX behave correctly alongside rows written
/// by column defaults.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Current UTC time in the canonical storage format.
pub(crate) fn now_ts() -> String {
    fmt_ts(Utc::now())
}
