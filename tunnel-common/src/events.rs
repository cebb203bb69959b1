//! Domain event types and EventBus
//!
//! Services publish what happened (profile resolved, inspection analyzed,
//! alert raised) and any number of consumers (dashboards, notifiers,
//! audit) subscribe. Events are serializable so a presentation layer can
//! forward them as-is.

use crate::db::models::{EmergencyAlert, Profile};
use crate::taxonomy::{AlertStatus, DefectType, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Inspection system events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InspectionEvent {
    /// A signed-in identity now has a role-bound profile
    ProfileResolved {
        profile: Profile,
        timestamp: DateTime<Utc>,
    },

    /// A signed-in identity has no profile yet; the UI must ask for a role
    RoleSelectionRequired {
        identity_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// The session was cleared (sign-out, local or remote)
    SessionEnded {
        timestamp: DateTime<Utc>,
    },

    /// Classification succeeded and the inspection moved to Analyzed
    InspectionAnalyzed {
        inspection_id: Uuid,
        section_id: Uuid,
        engineer_id: Uuid,
        defect_type: DefectType,
        severity: Severity,
        confidence_score: f64,
        timestamp: DateTime<Utc>,
    },

    /// Classification failed; the inspection stays Pending
    InspectionAnalysisFailed {
        inspection_id: Uuid,
        engineer_id: Uuid,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// New emergency alert (inspector-initiated or severity-triggered)
    AlertRaised {
        alert: EmergencyAlert,
        timestamp: DateTime<Utc>,
    },

    /// Alert advanced along Active → In Progress → Resolved
    AlertStatusChanged {
        alert_id: Uuid,
        old_status: AlertStatus,
        new_status: AlertStatus,
        timestamp: DateTime<Utc>,
    },
}

impl InspectionEvent {
    /// Event type name (matches the serialized `type` tag)
    pub fn event_type(&self) -> &'static str {
        match self {
            InspectionEvent::ProfileResolved { .. } => "ProfileResolved",
            InspectionEvent::RoleSelectionRequired { .. } => "RoleSelectionRequired",
            InspectionEvent::SessionEnded { .. } => "SessionEnded",
            InspectionEvent::InspectionAnalyzed { .. } => "InspectionAnalyzed",
            InspectionEvent::InspectionAnalysisFailed { .. } => "InspectionAnalysisFailed",
            InspectionEvent::AlertRaised { .. } => "AlertRaised",
            InspectionEvent::AlertStatusChanged { .. } => "AlertStatusChanged",
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged subscribers drop the oldest events instead of stalling
///
/// # Examples
///
/// ```
/// use tunnel_common::events::{EventBus, InspectionEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(InspectionEvent::SessionEnded {
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(InspectionEvent::SessionEnded { .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<InspectionEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<InspectionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: InspectionEvent,
    ) -> Result<usize, broadcast::error::SendError<InspectionEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: InspectionEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
