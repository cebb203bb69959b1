//! Identity session adapter
//!
//! Owns the local view of the current session and re-publishes provider
//! session changes on its own channel. A change is published only when it
//! alters the local state, so a sign-in echoed back by the provider after
//! `sign_in` already applied it is delivered once.
//!
//! Local sign-in and sign-out start a new generation and re-subscribe to the
//! provider. Provider changes queued before that point are dropped, so a
//! stale sign-in echo cannot resurrect a session that was signed out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::IdentityError;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Authenticated identity as known to the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub identity: Identity,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Session transition reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionChange {
    SignedIn(Session),
    TokenRefreshed(Session),
    SignedOut,
}

impl SessionChange {
    /// Session in effect after this change
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionChange::SignedIn(session) | SessionChange::TokenRefreshed(session) => Some(session),
            SessionChange::SignedOut => None,
        }
    }
}

/// External identity provider contract
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_session(&self) -> Result<Option<Session>, IdentityError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, IdentityError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, IdentityError>;

    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// Stream of session changes in provider order
    fn session_changes(&self) -> broadcast::Receiver<SessionChange>;
}

struct LocalSession {
    session: Option<Session>,
    /// Bumped by every local sign-in/out; provider changes from an older
    /// generation are discarded
    generation: u64,
}

struct SessionState {
    current: RwLock<LocalSession>,
    changes: broadcast::Sender<SessionChange>,
}

impl SessionState {
    /// Publish `change` if it alters the session; caller holds the write lock
    fn publish(&self, local: &mut LocalSession, change: SessionChange) -> bool {
        let next = change.session().cloned();
        if local.session == next {
            return false;
        }

        local.session = next;
        let _ = self.changes.send(change);
        true
    }

    /// Apply a provider change observed by the pump of `generation`
    async fn apply_remote(&self, generation: u64, change: SessionChange) -> bool {
        // Held across the send so publication order matches state order
        let mut local = self.current.write().await;
        if local.generation != generation {
            tracing::debug!(
                stale_generation = generation,
                current_generation = local.generation,
                "Dropping provider session change superseded by a local operation"
            );
            return false;
        }
        self.publish(&mut local, change)
    }
}

/// Local session owner wrapping an `IdentityProvider`
pub struct IdentitySession {
    provider: Arc<dyn IdentityProvider>,
    state: Arc<SessionState>,
    pump: Mutex<JoinHandle<()>>,
}

impl IdentitySession {
    /// Load the provider's current session and start following its changes
    pub async fn connect(provider: Arc<dyn IdentityProvider>) -> Result<Self, IdentityError> {
        // Subscribe before reading so nothing between the two is missed
        let provider_changes = provider.session_changes();
        let initial = provider.current_session().await?;

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let state = Arc::new(SessionState {
            current: RwLock::new(LocalSession {
                session: initial,
                generation: 0,
            }),
            changes,
        });

        let pump = spawn_pump(Arc::clone(&state), provider_changes, 0);

        Ok(Self {
            provider,
            state,
            pump: Mutex::new(pump),
        })
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.state.current.read().await.session.clone()
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, IdentityError> {
        let session = self.provider.sign_in_with_password(email, password).await?;
        tracing::info!(identity_id = %session.identity.id, "Signed in");
        self.apply_local(SessionChange::SignedIn(session.clone())).await;
        Ok(session)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let identity = self.provider.sign_up(email, password).await?;
        tracing::info!(identity_id = %identity.id, "Identity registered");
        Ok(identity)
    }

    /// Clear the local session; a failed remote sign-out is only logged
    pub async fn sign_out(&self) {
        if let Err(e) = self.provider.sign_out().await {
            tracing::warn!(error = %e, "Remote sign-out failed, clearing local session anyway");
        }
        self.apply_local(SessionChange::SignedOut).await;
    }

    /// Apply a locally initiated change and restart the provider pump
    ///
    /// Provider changes still queued from before this call (such as the
    /// echo of a sign-in that a sign-out has already replaced) belong to
    /// the old generation and are never applied.
    async fn apply_local(&self, change: SessionChange) {
        let mut local = self.state.current.write().await;
        local.generation += 1;
        let generation = local.generation;

        // The old pump cannot be inside apply_remote while the write lock
        // is held, so aborting here is final
        let fresh = spawn_pump(Arc::clone(&self.state), self.provider.session_changes(), generation);
        let mut pump = self.pump.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *pump, fresh).abort();
        drop(pump);

        self.state.publish(&mut local, change);
    }

    /// Raw change stream; each receiver sees every published change once
    pub fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.state.changes.subscribe()
    }

    /// Run `handler` for each change, one at a time, until unsubscribed
    pub fn on_change<F, Fut>(&self, mut handler: F) -> SessionSubscription
    where
        F: FnMut(SessionChange) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut rx = self.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) => handler(change).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Session subscriber lagged, changes dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        SessionSubscription { handle }
    }
}

/// Follow the provider's change stream on behalf of one generation
fn spawn_pump(
    state: Arc<SessionState>,
    mut provider_changes: broadcast::Receiver<SessionChange>,
    generation: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match provider_changes.recv().await {
                Ok(change) => {
                    state.apply_remote(generation, change).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Identity provider session changes lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!("Identity provider session stream closed");
                    break;
                }
            }
        }
    })
}

impl Drop for IdentitySession {
    fn drop(&mut self) {
        self.pump.lock().unwrap_or_else(PoisonError::into_inner).abort();
    }
}

/// Handle returned by `IdentitySession::on_change`
pub struct SessionSubscription {
    handle: JoinHandle<()>,
}

impl SessionSubscription {
    /// Stop delivery; a handler already running is cancelled at its next await
    pub fn unsubscribe(self) {
        self.handle.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}
