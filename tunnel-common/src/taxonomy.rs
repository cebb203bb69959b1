//! Defect taxonomy and the closed status/role enums
//!
//! Every string-valued column in the schema (`role`, `severity`,
//! `defect_type`, `status`) maps onto one of these enums. Stored text is
//! produced by `as_str()`/`label()` and parsed back with `FromStr`, so
//! an unexpected value in the database surfaces as `Error::InvalidInput`
//! instead of leaking through as a free-form string.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Defect severity, ordered `Low < Medium < High < Critical`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// All severities in ascending order
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(Error::InvalidInput(format!("Unknown severity: {}", other))),
        }
    }
}

/// Inclusive range of severities a defect type is expected to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityBand {
    pub min: Severity,
    pub max: Severity,
}

impl SeverityBand {
    pub const fn new(min: Severity, max: Severity) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, severity: Severity) -> bool {
        severity >= self.min && severity <= self.max
    }
}

/// Fixed defect taxonomy
///
/// Classifier labels that match none of the known types land in
/// `Unclassified` rather than failing the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DefectType {
    #[serde(rename = "Crack")]
    Crack,
    #[serde(rename = "Water Seepage")]
    WaterSeepage,
    #[serde(rename = "Structural Damage")]
    StructuralDamage,
    #[serde(rename = "No Defects")]
    NoDefects,
    #[serde(rename = "Unclassified")]
    Unclassified,
}

impl DefectType {
    pub const ALL: [DefectType; 5] = [
        DefectType::Crack,
        DefectType::WaterSeepage,
        DefectType::StructuralDamage,
        DefectType::NoDefects,
        DefectType::Unclassified,
    ];

    /// Display label, also the stored column value
    pub fn label(&self) -> &'static str {
        match self {
            DefectType::Crack => "Crack",
            DefectType::WaterSeepage => "Water Seepage",
            DefectType::StructuralDamage => "Structural Damage",
            DefectType::NoDefects => "No Defects",
            DefectType::Unclassified => "Unclassified",
        }
    }

    /// Strict label parse
    ///
    /// Case-insensitive; `_`, `-` and repeated whitespace are treated as a
    /// single space, so `"water_seepage"` and `"Water  Seepage"` both match.
    pub fn parse_label(raw: &str) -> Option<DefectType> {
        let normalized = raw
            .trim()
            .to_ascii_lowercase()
            .replace(['_', '-'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        DefectType::ALL
            .into_iter()
            .find(|defect| defect.label().to_ascii_lowercase() == normalized)
    }

    /// Severity band this defect type normally falls into
    pub fn severity_band(&self) -> SeverityBand {
        match self {
            DefectType::NoDefects => SeverityBand::new(Severity::Low, Severity::Low),
            DefectType::WaterSeepage => SeverityBand::new(Severity::Low, Severity::High),
            DefectType::Crack => SeverityBand::new(Severity::Low, Severity::Critical),
            DefectType::StructuralDamage => SeverityBand::new(Severity::Medium, Severity::Critical),
            DefectType::Unclassified => SeverityBand::new(Severity::Low, Severity::Critical),
        }
    }
}

impl fmt::Display for DefectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DefectType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DefectType::parse_label(s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown defect type: {}", s)))
    }
}

/// Inspection lifecycle: Pending → Analyzed → Resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InspectionStatus {
    Pending,
    Analyzed,
    Resolved,
}

impl InspectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InspectionStatus::Pending => "Pending",
            InspectionStatus::Analyzed => "Analyzed",
            InspectionStatus::Resolved => "Resolved",
        }
    }
}

impl fmt::Display for InspectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InspectionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(InspectionStatus::Pending),
            "Analyzed" => Ok(InspectionStatus::Analyzed),
            "Resolved" => Ok(InspectionStatus::Resolved),
            other => Err(Error::InvalidInput(format!("Unknown inspection status: {}", other))),
        }
    }
}

/// Emergency alert lifecycle: Active → In Progress → Resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AlertStatus {
    Active,
    #[serde(rename = "In Progress")]
    InProgress,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "Active",
            AlertStatus::InProgress => "In Progress",
            AlertStatus::Resolved => "Resolved",
        }
    }

    /// The only status this one may advance to
    pub fn next(&self) -> Option<AlertStatus> {
        match self {
            AlertStatus::Active => Some(AlertStatus::InProgress),
            AlertStatus::InProgress => Some(AlertStatus::Resolved),
            AlertStatus::Resolved => None,
        }
    }

    pub fn can_advance_to(&self, target: AlertStatus) -> bool {
        self.next() == Some(target)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(AlertStatus::Active),
            "In Progress" | "InProgress" => Ok(AlertStatus::InProgress),
            "Resolved" => Ok(AlertStatus::Resolved),
            other => Err(Error::InvalidInput(format!("Unknown alert status: {}", other))),
        }
    }
}

/// Profile role, fixed at provisioning time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Inspector,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Inspector => "Inspector",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Admin" => Ok(Role::Admin),
            "Inspector" => Ok(Role::Inspector),
            other => Err(Error::InvalidInput(format!("Unknown role: {}", other))),
        }
    }
}
