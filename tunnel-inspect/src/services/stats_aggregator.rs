//! Dashboard counters
//!
//! Every call reads the repository afresh; nothing is cached. `today` is a
//! parameter so overdue counts are reproducible in tests.

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use tunnel_common::time::calendar_days_since;
use tunnel_common::{InspectionStatus, Result, Role, Severity};
use uuid::Uuid;

use crate::db::{inspections, profiles};

/// Pending inspections older than this many whole calendar days are overdue
pub const OVERDUE_AFTER_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_inspectors: i64,
    pub total_inspections: i64,
    pub critical_defects: i64,
    pub pending_inspections: i64,
    /// Classified inspections per severity, every severity present
    pub severity_breakdown: BTreeMap<Severity, i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectorStats {
    pub total_inspections: i64,
    /// Inspections with any defect type recorded, "No Defects" included
    pub defects_found: i64,
    pub scheduled: i64,
    pub overdue: i64,
}

pub struct StatsAggregator {
    pool: SqlitePool,
}

impl StatsAggregator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn admin_stats(&self, today: NaiveDate) -> Result<AdminStats> {
        let total_inspectors = profiles::count_by_role(&self.pool, Role::Inspector).await?;
        let total_inspections = inspections::count_inspections(&self.pool).await?;
        let pending_inspections =
            inspections::count_by_status(&self.pool, InspectionStatus::Pending).await?;

        let counts = inspections::count_by_severity(&self.pool).await?;
        let severity_breakdown: BTreeMap<Severity, i64> = Severity::ALL
            .into_iter()
            .map(|severity| (severity, counts.get(&severity).copied().unwrap_or(0)))
            .collect();
        let critical_defects = counts.get(&Severity::Critical).copied().unwrap_or(0);

        tracing::debug!(
            %today,
            total_inspections,
            critical_defects,
            "Admin stats computed"
        );

        Ok(AdminStats {
            total_inspectors,
            total_inspections,
            critical_defects,
            pending_inspections,
            severity_breakdown,
        })
    }

    pub async fn inspector_stats(&self, engineer_id: Uuid, today: NaiveDate) -> Result<InspectorStats> {
        let counts = inspections::engineer_counts(&self.pool, engineer_id).await?;
        let pending_dates = inspections::pending_inspection_dates(&self.pool, Some(engineer_id)).await?;

        let overdue = pending_dates
            .into_iter()
            .filter(|date| is_overdue(calendar_days_since(*date, today)))
            .count() as i64;

        Ok(InspectorStats {
            total_inspections: counts.total,
            defects_found: counts.with_defect_type,
            scheduled: counts.pending,
            overdue,
        })
    }
}

fn is_overdue(days: i64) -> bool {
    days > OVERDUE_AFTER_DAYS
}
