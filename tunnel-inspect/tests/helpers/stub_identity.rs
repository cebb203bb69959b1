//! In-memory identity provider
//!
//! Accounts live in a map; every sign-in/out is echoed on the change
//! stream the way a hosted provider would.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;
use tunnel_inspect::services::{Identity, IdentityProvider, Session, SessionChange};
use tunnel_inspect::IdentityError;
use uuid::Uuid;

pub struct InMemoryIdentityProvider {
    accounts: Mutex<HashMap<String, (String, Identity)>>,
    current: Mutex<Option<Session>>,
    changes: broadcast::Sender<SessionChange>,
    offline: AtomicBool,
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(32);
        Self {
            accounts: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            changes,
            offline: AtomicBool::new(false),
        }
    }

    /// Simulate the provider being unreachable
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Push a token refresh for the current session
    pub fn refresh_token(&self) -> Option<Session> {
        let mut current = self.current.lock().unwrap();
        let session = current.as_mut()?;
        session.access_token = format!("token-{}", Uuid::new_v4());
        let refreshed = session.clone();
        let _ = self.changes.send(SessionChange::TokenRefreshed(refreshed.clone()));
        Some(refreshed)
    }

    fn check_online(&self) -> Result<(), IdentityError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(IdentityError::ProviderUnavailable("provider offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for InMemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn current_session(&self) -> Result<Option<Session>, IdentityError> {
        self.check_online()?;
        Ok(self.current.lock().unwrap().clone())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, IdentityError> {
        self.check_online()?;
        let identity = {
            let accounts = self.accounts.lock().unwrap();
            match accounts.get(&email.to_ascii_lowercase()) {
                Some((stored, identity)) if stored == password => identity.clone(),
                _ => return Err(IdentityError::InvalidCredentials),
            }
        };

        let session = Session {
            identity,
            access_token: format!("token-{}", Uuid::new_v4()),
            expires_at: tunnel_common::time::now() + chrono::Duration::hours(1),
        };
        *self.current.lock().unwrap() = Some(session.clone());
        let _ = self.changes.send(SessionChange::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        self.check_online()?;
        let mut accounts = self.accounts.lock().unwrap();
        let key = email.to_ascii_lowercase();
        if accounts.contains_key(&key) {
            return Err(IdentityError::EmailInUse);
        }

        let identity = Identity {
            id: Uuid::new_v4(),
            email: email.to_string(),
        };
        accounts.insert(key, (password.to_string(), identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.check_online()?;
        *self.current.lock().unwrap() = None;
        let _ = self.changes.send(SessionChange::SignedOut);
        Ok(())
    }

    fn session_changes(&self) -> broadcast::Receiver<SessionChange> {
        self.changes.subscribe()
    }
}
