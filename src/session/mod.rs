//! Authenticated browser sessions.
//!
//! A session is created after a successful OAuth callback and lives for a
//! fixed TTL. Expiry is enforced lazily: the first access past `expires_at`
//! deletes the record and rejects the request. A periodic sweep removes
//! sessions nobody comes back for.

mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::oauth::OAuthError;

pub use memory::InMemorySessionStore;

/// Identity-provider claims copied into the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Subject id at the identity provider
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub profile: UserProfile,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Authentication failures surfaced to the caller.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Not authenticated")]
    MissingSession,

    #[error("Invalid session")]
    InvalidSession,

    #[error("Session expired")]
    SessionExpired,

    #[error("Invalid OAuth state")]
    StateMismatch,

    #[error("Missing authorization code")]
    MissingCode,

    #[error("Authentication failed: {0}")]
    Provider(#[from] OAuthError),

    #[error("Session store error: {0}")]
    Store(String),
}

/// Backing storage for sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Session>, String>;

    async fn put(&self, session: Session) -> Result<(), String>;

    /// Returns whether a session was removed.
    async fn delete(&self, id: &str) -> Result<bool, String>;

    /// Remove every session expired at `now`; returns how many were removed.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, String>;
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn create(&self, profile: UserProfile) -> Result<Session, AuthError> {
        self.create_at(profile, Utc::now()).await
    }

    pub async fn create_at(
        &self,
        profile: UserProfile,
        now: DateTime<Utc>,
    ) -> Result<Session, AuthError> {
        let session = Session {
            id: new_session_id(),
            profile,
            created_at: now,
            expires_at: now + self.ttl,
        };
        self.store
            .put(session.clone())
            .await
            .map_err(AuthError::Store)?;
        tracing::info!("Created session for {}", session.profile.sub);
        Ok(session)
    }

    pub async fn validate(&self, id: &str) -> Result<Session, AuthError> {
        self.validate_at(id, Utc::now()).await
    }

    /// Look up a live session. An expired one is deleted, then rejected.
    pub async fn validate_at(&self, id: &str, now: DateTime<Utc>) -> Result<Session, AuthError> {
        let session = self
            .store
            .get(id)
            .await
            .map_err(AuthError::Store)?
            .ok_or(AuthError::InvalidSession)?;

        if session.is_expired_at(now) {
            self.store.delete(id).await.map_err(AuthError::Store)?;
            tracing::info!("Session for {} expired; deleted", session.profile.sub);
            return Err(AuthError::SessionExpired);
        }
        Ok(session)
    }

    pub async fn logout(&self, id: &str) -> Result<bool, AuthError> {
        self.store.delete(id).await.map_err(AuthError::Store)
    }

    pub async fn sweep_expired(&self) -> Result<usize, AuthError> {
        self.store
            .sweep_expired(Utc::now())
            .await
            .map_err(AuthError::Store)
    }
}

/// Evict expired sessions on a fixed period, in addition to lazy expiry.
pub fn spawn_sweeper(sessions: SessionManager, every: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match sessions.sweep_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::info!("Swept {} expired sessions", removed),
                Err(e) => tracing::warn!("Session sweep failed: {}", e),
            }
        }
    })
}

/// 32 random bytes, URL-safe base64 without padding.
fn new_session_id() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
pub(crate) fn test_profile() -> UserProfile {
    UserProfile {
        sub: "1234567890".to_string(),
        email: Some("visitor@example.com".to_string()),
        name: Some("Rextro Visitor".to_string()),
        picture: None,
    }
}
