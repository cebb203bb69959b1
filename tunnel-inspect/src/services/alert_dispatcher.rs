//! Emergency alert lifecycle
//!
//! Alerts move Active → In Progress → Resolved, one step at a time. Each
//! advance is a compare-and-swap on the stored status, so two concurrent
//! advances from Active cannot together skip to Resolved: the second one
//! observes In Progress and is rejected.

use sqlx::SqlitePool;
use tunnel_common::db::models::EmergencyAlert;
use tunnel_common::events::{EventBus, InspectionEvent};
use tunnel_common::AlertStatus;
use uuid::Uuid;

use crate::db::alerts;
use crate::error::AlertError;
use crate::utils::{max_lock_wait_ms, retry_on_lock};

pub struct AlertDispatcher {
    pool: SqlitePool,
    event_bus: EventBus,
}

impl AlertDispatcher {
    pub fn new(pool: SqlitePool, event_bus: EventBus) -> Self {
        Self { pool, event_bus }
    }

    /// Raise a new Active alert
    pub async fn raise(
        &self,
        inspector_id: Uuid,
        tunnel_id: Option<Uuid>,
        message: &str,
        urgent: bool,
    ) -> Result<EmergencyAlert, AlertError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AlertError::EmptyMessage);
        }

        let alert = EmergencyAlert {
            alert_id: Uuid::new_v4(),
            inspector_id,
            tunnel_id,
            message: message.to_string(),
            urgent,
            status: AlertStatus::Active,
            created_at: tunnel_common::time::now(),
        };

        let max_wait = max_lock_wait_ms(&self.pool).await?;
        retry_on_lock("insert_alert", max_wait, || alerts::insert_alert(&self.pool, &alert)).await?;

        tracing::info!(
            alert_id = %alert.alert_id,
            inspector_id = %inspector_id,
            urgent,
            "Emergency alert raised"
        );

        self.event_bus.emit_lossy(InspectionEvent::AlertRaised {
            alert: alert.clone(),
            timestamp: tunnel_common::time::now(),
        });

        Ok(alert)
    }

    /// Move an alert to `next_status`
    ///
    /// Only the single next step is allowed. Losing a race to another
    /// advance is reported as `InvalidTransition` from the status that
    /// writer left behind.
    pub async fn advance(
        &self,
        alert_id: Uuid,
        next_status: AlertStatus,
    ) -> Result<EmergencyAlert, AlertError> {
        let current = alerts::load_alert(&self.pool, alert_id)
            .await?
            .ok_or(AlertError::NotFound(alert_id))?;

        if !current.status.can_advance_to(next_status) {
            return Err(AlertError::InvalidTransition {
                from: current.status,
                to: next_status,
            });
        }

        let max_wait = max_lock_wait_ms(&self.pool).await?;
        let swapped = retry_on_lock("advance_alert", max_wait, || {
            alerts::compare_and_set_status(&self.pool, alert_id, current.status, next_status)
        })
        .await?;

        if !swapped {
            let observed = alerts::load_alert(&self.pool, alert_id)
                .await?
                .ok_or(AlertError::NotFound(alert_id))?;
            tracing::debug!(
                alert_id = %alert_id,
                expected = %current.status,
                observed = %observed.status,
                "Alert status changed concurrently"
            );
            return Err(AlertError::InvalidTransition {
                from: observed.status,
                to: next_status,
            });
        }

        tracing::info!(
            alert_id = %alert_id,
            old_status = %current.status,
            new_status = %next_status,
            "Alert status advanced"
        );

        self.event_bus.emit_lossy(InspectionEvent::AlertStatusChanged {
            alert_id,
            old_status: current.status,
            new_status: next_status,
            timestamp: tunnel_common::time::now(),
        });

        Ok(EmergencyAlert {
            status: next_status,
            ..current
        })
    }

    pub async fn get(&self, alert_id: Uuid) -> Result<EmergencyAlert, AlertError> {
        alerts::load_alert(&self.pool, alert_id)
            .await?
            .ok_or(AlertError::NotFound(alert_id))
    }

    /// Alerts raised by one inspector, newest first
    pub async fn list_by_inspector(&self, inspector_id: Uuid) -> Result<Vec<EmergencyAlert>, AlertError> {
        Ok(alerts::list_by_inspector(&self.pool, inspector_id).await?)
    }

    /// Newest `limit` alerts, newest first
    pub async fn list_recent(&self, limit: u32) -> Result<Vec<EmergencyAlert>, AlertError> {
        Ok(alerts::list_recent(&self.pool, i64::from(limit)).await?)
    }
}
