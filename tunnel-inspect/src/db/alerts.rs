//! Emergency alert database operations

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tunnel_common::db::models::EmergencyAlert;
use tunnel_common::time::{format_timestamp, parse_timestamp};
use tunnel_common::{AlertStatus, Result};
use uuid::Uuid;

use super::{parse_optional_uuid, parse_uuid};

const ALERT_COLUMNS: &str =
    "alert_id, inspector_id, tunnel_id, message, urgent, status, created_at";

pub async fn insert_alert(pool: &SqlitePool, alert: &EmergencyAlert) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO emergency_alerts (
            alert_id, inspector_id, tunnel_id, message, urgent, status, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(alert.alert_id.to_string())
    .bind(alert.inspector_id.to_string())
    .bind(alert.tunnel_id.map(|id| id.to_string()))
    .bind(&alert.message)
    .bind(alert.urgent)
    .bind(alert.status.as_str())
    .bind(format_timestamp(&alert.created_at))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_alert(pool: &SqlitePool, alert_id: Uuid) -> Result<Option<EmergencyAlert>> {
    let query = format!("SELECT {} FROM emergency_alerts WHERE alert_id = ?", ALERT_COLUMNS);
    let row = sqlx::query(&query)
        .bind(alert_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|r| alert_from_row(&r)).transpose()
}

/// Set `status` to `to` only if it is currently `from`
///
/// Returns false when another writer changed the status first (or the
/// alert does not exist).
pub async fn compare_and_set_status(
    pool: &SqlitePool,
    alert_id: Uuid,
    from: AlertStatus,
    to: AlertStatus,
) -> Result<bool> {
    let result =
        sqlx::query("UPDATE emergency_alerts SET status = ? WHERE alert_id = ? AND status = ?")
            .bind(to.as_str())
            .bind(alert_id.to_string())
            .bind(from.as_str())
            .execute(pool)
            .await?;

    Ok(result.rows_affected() == 1)
}

/// Alerts raised by one inspector, newest first (ties by alert id)
pub async fn list_by_inspector(
    pool: &SqlitePool,
    inspector_id: Uuid,
) -> Result<Vec<EmergencyAlert>> {
    let query = format!(
        "SELECT {} FROM emergency_alerts WHERE inspector_id = ? \
         ORDER BY created_at DESC, alert_id DESC",
        ALERT_COLUMNS
    );
    let rows = sqlx::query(&query)
        .bind(inspector_id.to_string())
        .fetch_all(pool)
        .await?;

    rows.iter().map(alert_from_row).collect()
}

/// Newest `limit` alerts across all inspectors
pub async fn list_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<EmergencyAlert>> {
    let query = format!(
        "SELECT {} FROM emergency_alerts ORDER BY created_at DESC, alert_id DESC LIMIT ?",
        ALERT_COLUMNS
    );
    let rows = sqlx::query(&query).bind(limit.max(0)).fetch_all(pool).await?;

    rows.iter().map(alert_from_row).collect()
}

fn alert_from_row(row: &SqliteRow) -> Result<EmergencyAlert> {
    let alert_id: String = row.get("alert_id");
    let inspector_id: String = row.get("inspector_id");
    let tunnel_id: Option<String> = row.get("tunnel_id");
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");

    Ok(EmergencyAlert {
        alert_id: parse_uuid("alert_id", &alert_id)?,
        inspector_id: parse_uuid("inspector_id", &inspector_id)?,
        tunnel_id: parse_optional_uuid("tunnel_id", tunnel_id)?,
        message: row.get("message"),
        urgent: row.get("urgent"),
        status: status.parse()?,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}
