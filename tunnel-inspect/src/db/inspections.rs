//! Inspection and crack feature database operations
//!
//! The Pending → Analyzed transition and the CrackFeature insert share one
//! transaction. The status update is conditional on `status = 'Pending'`,
//! so two concurrent analyses of the same inspection cannot both apply.

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::collections::HashMap;
use tunnel_common::db::models::{Classification, CrackFeature, CrackMetrics, Inspection};
use tunnel_common::time::{format_timestamp, parse_timestamp};
use tunnel_common::{Error, InspectionStatus, Result, Severity};
use uuid::Uuid;

use super::parse_uuid;

const INSPECTION_COLUMNS: &str = "inspection_id, section_id, engineer_id, inspection_date, notes, \
     image_url, defect_type, severity, confidence_score, status, created_at";

/// Result of attempting the Pending → Analyzed write
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisWrite {
    /// This call performed the transition
    Applied {
        inspection: Inspection,
        crack_feature: CrackFeature,
    },
    /// The inspection had already left Pending; nothing was written
    Superseded {
        inspection: Inspection,
        crack_feature: Option<CrackFeature>,
    },
}

/// Insert a new inspection row (normally status Pending, no classification)
pub async fn insert_inspection(pool: &SqlitePool, inspection: &Inspection) -> Result<()> {
    let classification = inspection.classification;

    sqlx::query(
        r#"
        INSERT INTO inspections (
            inspection_id, section_id, engineer_id, inspection_date, notes, image_url,
            defect_type, severity, confidence_score, status, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(inspection.inspection_id.to_string())
    .bind(inspection.section_id.to_string())
    .bind(inspection.engineer_id.to_string())
    .bind(format_timestamp(&inspection.inspection_date))
    .bind(&inspection.notes)
    .bind(&inspection.image_url)
    .bind(classification.map(|c| c.defect_type.label()))
    .bind(classification.map(|c| c.severity.as_str()))
    .bind(classification.map(|c| c.confidence_score))
    .bind(inspection.status.as_str())
    .bind(format_timestamp(&inspection.created_at))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_inspection(pool: &SqlitePool, inspection_id: Uuid) -> Result<Option<Inspection>> {
    let query = format!(
        "SELECT {} FROM inspections WHERE inspection_id = ?",
        INSPECTION_COLUMNS
    );
    let row = sqlx::query(&query)
        .bind(inspection_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|r| inspection_from_row(&r)).transpose()
}

/// Most recent inspections by one engineer, newest first
pub async fn list_recent_for_engineer(
    pool: &SqlitePool,
    engineer_id: Uuid,
    limit: i64,
) -> Result<Vec<Inspection>> {
    let query = format!(
        "SELECT {} FROM inspections WHERE engineer_id = ? \
         ORDER BY created_at DESC, inspection_id DESC LIMIT ?",
        INSPECTION_COLUMNS
    );
    let rows = sqlx::query(&query)
        .bind(engineer_id.to_string())
        .bind(limit.max(0))
        .fetch_all(pool)
        .await?;

    rows.iter().map(inspection_from_row).collect()
}

pub async fn load_crack_feature(
    pool: &SqlitePool,
    inspection_id: Uuid,
) -> Result<Option<CrackFeature>> {
    let row = sqlx::query(
        r#"
        SELECT feature_id, inspection_id, crack_density, avg_crack_length,
               max_crack_width, predicted_days_to_fix, created_at
        FROM crack_features
        WHERE inspection_id = ?
        "#,
    )
    .bind(inspection_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|r| crack_feature_from_row(&r)).transpose()
}

/// Write the classification and crack metrics, moving Pending → Analyzed
///
/// Both rows become visible together or not at all. If the inspection is
/// no longer Pending the transaction is rolled back and the stored state is
/// returned as `Superseded`. A missing inspection is `Error::NotFound`.
pub async fn complete_analysis(
    pool: &SqlitePool,
    inspection_id: Uuid,
    classification: Classification,
    metrics: CrackMetrics,
) -> Result<AnalysisWrite> {
    let id = inspection_id.to_string();
    let now = tunnel_common::time::now();
    let feature = CrackFeature {
        feature_id: Uuid::new_v4(),
        inspection_id,
        metrics,
        created_at: now,
    };

    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE inspections
        SET defect_type = ?, severity = ?, confidence_score = ?, status = 'Analyzed'
        WHERE inspection_id = ? AND status = 'Pending'
        "#,
    )
    .bind(classification.defect_type.label())
    .bind(classification.severity.as_str())
    .bind(classification.confidence_score)
    .bind(&id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        tx.rollback().await?;

        let inspection = load_inspection(pool, inspection_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("inspection {}", inspection_id)))?;
        let crack_feature = load_crack_feature(pool, inspection_id).await?;
        return Ok(AnalysisWrite::Superseded {
            inspection,
            crack_feature,
        });
    }

    sqlx::query(
        r#"
        INSERT INTO crack_features (
            feature_id, inspection_id, crack_density, avg_crack_length,
            max_crack_width, predicted_days_to_fix, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(feature.feature_id.to_string())
    .bind(&id)
    .bind(metrics.crack_density)
    .bind(metrics.avg_crack_length)
    .bind(metrics.max_crack_width)
    .bind(metrics.predicted_days_to_fix)
    .bind(format_timestamp(&now))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let inspection = load_inspection(pool, inspection_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("inspection {}", inspection_id)))?;

    Ok(AnalysisWrite::Applied {
        inspection,
        crack_feature: feature,
    })
}

/// Move an Analyzed inspection to Resolved; false if it was not Analyzed
pub async fn mark_resolved(pool: &SqlitePool, inspection_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE inspections SET status = 'Resolved' WHERE inspection_id = ? AND status = 'Analyzed'",
    )
    .bind(inspection_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Per-engineer counters read in one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineerCounts {
    pub total: i64,
    pub with_defect_type: i64,
    pub pending: i64,
}

pub async fn engineer_counts(pool: &SqlitePool, engineer_id: Uuid) -> Result<EngineerCounts> {
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(*) AS total,
            COUNT(defect_type) AS with_defect_type,
            COALESCE(SUM(CASE WHEN status = 'Pending' THEN 1 ELSE 0 END), 0) AS pending
        FROM inspections
        WHERE engineer_id = ?
        "#,
    )
    .bind(engineer_id.to_string())
    .fetch_one(pool)
    .await?;

    Ok(EngineerCounts {
        total: row.get("total"),
        with_defect_type: row.get("with_defect_type"),
        pending: row.get("pending"),
    })
}

/// `inspection_date` of every Pending inspection, optionally for one engineer
pub async fn pending_inspection_dates(
    pool: &SqlitePool,
    engineer_id: Option<Uuid>,
) -> Result<Vec<DateTime<Utc>>> {
    let rows = match engineer_id {
        Some(id) => {
            sqlx::query(
                "SELECT inspection_date FROM inspections WHERE status = 'Pending' AND engineer_id = ?",
            )
            .bind(id.to_string())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query("SELECT inspection_date FROM inspections WHERE status = 'Pending'")
                .fetch_all(pool)
                .await?
        }
    };

    rows.iter()
        .map(|row| {
            let value: String = row.get("inspection_date");
            parse_timestamp("inspection_date", &value)
        })
        .collect()
}

pub async fn count_inspections(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM inspections")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn count_by_status(pool: &SqlitePool, status: InspectionStatus) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM inspections WHERE status = ?")
        .bind(status.as_str())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Classified inspections per severity; severities with no rows are absent
pub async fn count_by_severity(pool: &SqlitePool) -> Result<HashMap<Severity, i64>> {
    let rows = sqlx::query(
        "SELECT severity, COUNT(*) AS n FROM inspections WHERE severity IS NOT NULL GROUP BY severity",
    )
    .fetch_all(pool)
    .await?;

    let mut counts = HashMap::new();
    for row in rows {
        let severity: String = row.get("severity");
        counts.insert(severity.parse::<Severity>()?, row.get::<i64, _>("n"));
    }
    Ok(counts)
}

fn inspection_from_row(row: &SqliteRow) -> Result<Inspection> {
    let inspection_id: String = row.get("inspection_id");
    let section_id: String = row.get("section_id");
    let engineer_id: String = row.get("engineer_id");
    let inspection_date: String = row.get("inspection_date");
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");

    let defect_type: Option<String> = row.get("defect_type");
    let severity: Option<String> = row.get("severity");
    let confidence_score: Option<f64> = row.get("confidence_score");

    // The table CHECK keeps these all-or-none
    let classification = match (defect_type, severity, confidence_score) {
        (Some(defect_type), Some(severity), Some(confidence_score)) => Some(Classification {
            defect_type: defect_type.parse()?,
            severity: severity.parse()?,
            confidence_score,
        }),
        _ => None,
    };

    Ok(Inspection {
        inspection_id: parse_uuid("inspection_id", &inspection_id)?,
        section_id: parse_uuid("section_id", &section_id)?,
        engineer_id: parse_uuid("engineer_id", &engineer_id)?,
        inspection_date: parse_timestamp("inspection_date", &inspection_date)?,
        notes: row.get("notes"),
        image_url: row.get("image_url"),
        classification,
        status: status.parse()?,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

fn crack_feature_from_row(row: &SqliteRow) -> Result<CrackFeature> {
    let feature_id: String = row.get("feature_id");
    let inspection_id: String = row.get("inspection_id");
    let created_at: String = row.get("created_at");

    Ok(CrackFeature {
        feature_id: parse_uuid("feature_id", &feature_id)?,
        inspection_id: parse_uuid("inspection_id", &inspection_id)?,
        metrics: CrackMetrics {
            crack_density: row.get("crack_density"),
            avg_crack_length: row.get("avg_crack_length"),
            max_crack_width: row.get("max_crack_width"),
            predicted_days_to_fix: row.get("predicted_days_to_fix"),
        },
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}
