//! Repository access for tunnel-inspect
//!
//! Free functions over a shared `SqlitePool`, one module per aggregate.
//! Ids are stored as hyphenated UUID text and timestamps as fixed-width
//! RFC 3339 text (see `tunnel_common::time::format_timestamp`).

pub mod alerts;
pub mod assets;
pub mod inspections;
pub mod profiles;

use sqlx::SqlitePool;
use std::path::Path;
use tunnel_common::{Error, Result};
use uuid::Uuid;

/// Open (or create) the inspection database at `db_path`
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    tracing::debug!("Connecting to database: {}", db_path.display());
    tunnel_common::db::init_database(db_path).await
}

/// Parse a UUID column value
pub(crate) fn parse_uuid(column: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

pub(crate) fn parse_optional_uuid(column: &str, value: Option<String>) -> Result<Option<Uuid>> {
    value.map(|v| parse_uuid(column, &v)).transpose()
}
