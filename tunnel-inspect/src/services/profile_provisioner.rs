//! Profile provisioning
//!
//! Resolves a signed-in identity to its role-bound profile. An identity
//! without a profile is an expected outcome (`AwaitingRoleSelection`), not
//! an error: the caller collects a name and role and then calls
//! `complete_provisioning`.
//!
//! Concurrent provisioning of one identity is arbitrated by the primary key
//! on `profiles.id`. The losing insert re-reads the stored row and reports
//! it as `AlreadyProvisioned`.

use sqlx::SqlitePool;
use std::sync::Arc;
use tunnel_common::db::models::Profile;
use tunnel_common::events::{EventBus, InspectionEvent};
use tunnel_common::Role;
use uuid::Uuid;

use crate::db::profiles;
use crate::error::ProvisioningError;
use crate::services::identity_session::{IdentitySession, SessionChange, SessionSubscription};
use crate::utils::{max_lock_wait_ms, retry_on_lock};

/// Outcome of resolving an identity
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisioningOutcome {
    Resolved(Profile),
    AwaitingRoleSelection { identity_id: Uuid },
}

pub struct ProfileProvisioner {
    pool: SqlitePool,
    event_bus: EventBus,
}

impl ProfileProvisioner {
    pub fn new(pool: SqlitePool, event_bus: EventBus) -> Self {
        Self { pool, event_bus }
    }

    pub async fn resolve(&self, identity_id: Uuid) -> Result<ProvisioningOutcome, ProvisioningError> {
        match profiles::load_profile(&self.pool, identity_id).await? {
            Some(profile) => Ok(ProvisioningOutcome::Resolved(profile)),
            None => Ok(ProvisioningOutcome::AwaitingRoleSelection { identity_id }),
        }
    }

    /// Create the profile for `identity_id`
    ///
    /// Never retried on conflict: if another caller won, the stored profile
    /// comes back inside `AlreadyProvisioned`.
    pub async fn complete_provisioning(
        &self,
        identity_id: Uuid,
        full_name: &str,
        role: Role,
    ) -> Result<Profile, ProvisioningError> {
        let full_name = validate_full_name(full_name)?;

        let profile = Profile {
            id: identity_id,
            full_name,
            role,
            created_at: tunnel_common::time::now(),
        };

        let max_wait = max_lock_wait_ms(&self.pool).await?;
        let inserted = retry_on_lock("insert_profile", max_wait, || {
            profiles::insert_profile(&self.pool, &profile)
        })
        .await;

        match inserted {
            Ok(()) => {
                tracing::info!(profile_id = %profile.id, role = %profile.role, "Profile provisioned");
                self.event_bus.emit_lossy(InspectionEvent::ProfileResolved {
                    profile: profile.clone(),
                    timestamp: tunnel_common::time::now(),
                });
                Ok(profile)
            }
            Err(e) if e.is_unique_violation() => {
                match profiles::load_profile(&self.pool, identity_id).await? {
                    Some(existing) => {
                        tracing::info!(
                            profile_id = %identity_id,
                            "Profile already provisioned by a concurrent caller"
                        );
                        Err(ProvisioningError::AlreadyProvisioned { profile: existing })
                    }
                    None => Err(ProvisioningError::Storage(e)),
                }
            }
            Err(e) => Err(ProvisioningError::Storage(e)),
        }
    }

    /// Sign up a new identity and provision its profile in one step
    ///
    /// The name is validated before the identity provider is contacted.
    pub async fn register(
        &self,
        session: &IdentitySession,
        email: &str,
        password: &str,
        full_name: &str,
        role: Role,
    ) -> Result<Profile, ProvisioningError> {
        validate_full_name(full_name)?;
        let identity = session.sign_up(email, password).await?;
        self.complete_provisioning(identity.id, full_name, role).await
    }

    /// Re-resolve on every session change and publish the result
    pub fn spawn_session_listener(self: &Arc<Self>, session: &IdentitySession) -> SessionSubscription {
        let provisioner = Arc::clone(self);
        session.on_change(move |change| {
            let provisioner = Arc::clone(&provisioner);
            async move { provisioner.handle_session_change(change).await }
        })
    }

    async fn handle_session_change(&self, change: SessionChange) {
        let timestamp = tunnel_common::time::now();
        let Some(session) = change.session() else {
            self.event_bus.emit_lossy(InspectionEvent::SessionEnded { timestamp });
            return;
        };

        match self.resolve(session.identity.id).await {
            Ok(ProvisioningOutcome::Resolved(profile)) => {
                tracing::debug!(profile_id = %profile.id, "Session resolved to profile");
                self.event_bus
                    .emit_lossy(InspectionEvent::ProfileResolved { profile, timestamp });
            }
            Ok(ProvisioningOutcome::AwaitingRoleSelection { identity_id }) => {
                tracing::debug!(identity_id = %identity_id, "Session awaiting role selection");
                self.event_bus.emit_lossy(InspectionEvent::RoleSelectionRequired {
                    identity_id,
                    timestamp,
                });
            }
            Err(e) => {
                tracing::warn!(
                    identity_id = %session.identity.id,
                    error = %e,
                    "Failed to resolve profile for session"
                );
            }
        }
    }
}

fn validate_full_name(full_name: &str) -> Result<String, ProvisioningError> {
    let trimmed = full_name.trim();
    if trimmed.is_empty() {
        return Err(ProvisioningError::InvalidInput("Full name must not be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunnel_common::db::init_memory_database;

    async fn provisioner() -> (ProfileProvisioner, EventBus) {
        let pool = init_memory_database().await.unwrap();
        let bus = EventBus::new(16);
        (ProfileProvisioner::new(pool, bus.clone()), bus)
    }

    #[tokio::test]
    async fn test_unknown_identity_awaits_role_selection() {
        let (p, _) = provisioner().await;
        let id = Uuid::new_v4();

        assert_eq!(
            p.resolve(id).await.unwrap(),
            ProvisioningOutcome::AwaitingRoleSelection { identity_id: id }
        );
    }

    #[tokio::test]
    async fn test_complete_then_resolve() {
        let (p, bus) = provisioner().await;
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();

        let profile = p.complete_provisioning(id, "  Amara Lind ", Role::Inspector).await.unwrap();
        assert_eq!(profile.full_name, "Amara Lind");

        assert_eq!(p.resolve(id).await.unwrap(), ProvisioningOutcome::Resolved(profile));
        assert!(matches!(rx.try_recv(), Ok(InspectionEvent::ProfileResolved { .. })));
    }

    #[tokio::test]
    async fn test_second_provisioning_reports_existing_profile() {
        let (p, _) = provisioner().await;
        let id = Uuid::new_v4();
        let first = p.complete_provisioning(id, "Amara Lind", Role::Admin).await.unwrap();

        match p.complete_provisioning(id, "Someone Else", Role::Inspector).await {
            Err(ProvisioningError::AlreadyProvisioned { profile }) => assert_eq!(profile, first),
            other => panic!("expected AlreadyProvisioned, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let (p, _) = provisioner().await;
        let err = p.complete_provisioning(Uuid::new_v4(), "   ", Role::Inspector).await.unwrap_err();
        assert!(matches!(err, ProvisioningError::InvalidInput(_)));
    }
}
