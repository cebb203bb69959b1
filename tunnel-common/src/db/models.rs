//! Database models
//!
//! Row types for the six tables. Classification fields on an inspection
//! are grouped into a single `Option<Classification>` so that severity,
//! defect type and confidence are always present together or absent
//! together.

use crate::taxonomy::{AlertStatus, DefectType, InspectionStatus, Role, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authenticated person, keyed by the identity provider's user id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tunnel {
    pub tunnel_id: Uuid,
    pub name: String,
    pub location: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub section_id: Uuid,
    pub tunnel_id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Domain-mapped classifier verdict stored on an inspection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub defect_type: DefectType,
    pub severity: Severity,
    /// Always within [0, 100]
    pub confidence_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inspection {
    pub inspection_id: Uuid,
    pub section_id: Uuid,
    pub engineer_id: Uuid,
    pub inspection_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub image_url: Option<String>,
    pub classification: Option<Classification>,
    pub status: InspectionStatus,
    pub created_at: DateTime<Utc>,
}

impl Inspection {
    /// New Pending inspection dated now
    pub fn pending(section_id: Uuid, engineer_id: Uuid) -> Self {
        let now = crate::time::now();
        Self {
            inspection_id: Uuid::new_v4(),
            section_id,
            engineer_id,
            inspection_date: now,
            notes: None,
            image_url: None,
            classification: None,
            status: InspectionStatus::Pending,
            created_at: now,
        }
    }

    pub fn severity(&self) -> Option<Severity> {
        self.classification.map(|c| c.severity)
    }

    pub fn defect_type(&self) -> Option<DefectType> {
        self.classification.map(|c| c.defect_type)
    }
}

/// Quantitative crack metrics; absent fields stay absent
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CrackMetrics {
    pub crack_density: Option<f64>,
    pub avg_crack_length: Option<f64>,
    pub max_crack_width: Option<f64>,
    pub predicted_days_to_fix: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrackFeature {
    pub feature_id: Uuid,
    pub inspection_id: Uuid,
    pub metrics: CrackMetrics,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyAlert {
    pub alert_id: Uuid,
    pub inspector_id: Uuid,
    pub tunnel_id: Option<Uuid>,
    pub message: String,
    pub urgent: bool,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
}
