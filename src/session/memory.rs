//! In-memory session store (non-persistent).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{Session, SessionStore};

#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &str) -> Result<Option<Session>, String> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn put(&self, session: Session) -> Result<(), String> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, String> {
        Ok(self.sessions.write().await.remove(id).is_some())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, String> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired_at(now));
        Ok(before - sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_profile;
    use chrono::Duration;

    fn session(id: &str, expires_at: DateTime<Utc>) -> Session {
        Session {
            id: id.to_string(),
            profile: test_profile(),
            created_at: expires_at - Duration::hours(24),
            expires_at,
        }
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_sessions() {
        let store = InMemorySessionStore::new();
        let now = Utc::now();
        store.put(session("old", now - Duration::minutes(1))).await.unwrap();
        store.put(session("fresh", now + Duration::hours(1))).await.unwrap();

        assert_eq!(store.sweep_expired(now).await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
        assert!(store.get("fresh").await.unwrap().is_some());
        assert!(store.get("old").await.unwrap().is_none());
    }
}
