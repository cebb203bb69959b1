//! # Tunnel Inspection Common Library
//!
//! Shared code for the tunnel inspection workspace:
//! - Domain models and the defect taxonomy
//! - Database schema initialization
//! - Event types and EventBus
//! - Configuration loading and tracing setup
//! - Time utilities

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod logging;
pub mod taxonomy;
pub mod time;

pub use error::{Error, Result};
pub use taxonomy::{AlertStatus, DefectType, InspectionStatus, Role, Severity, SeverityBand};
