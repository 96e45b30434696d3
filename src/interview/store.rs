// src/interview/store.rs
//! In-memory session registry shared by the HTTP handlers

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::session::Session;

/// Sessions keyed by id. Clones share the same map.
///
/// Closures passed to [`SessionStore::update`] run under the write lock and
/// must not await anything.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self) -> Uuid {
        self.insert(Session::new()).await
    }

    pub async fn insert(&self, session: Session) -> Uuid {
        let id = session.id;
        self.sessions.write().await.insert(id, session);
        id
    }

    /// Snapshot of the session
    pub async fn get(&self, id: &Uuid) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Run `f` on the session and mark it active
    pub async fn update<R>(&self, id: &Uuid, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        self.sessions.write().await.get_mut(id).map(|session| {
            session.touch();
            f(session)
        })
    }

    pub async fn remove(&self, id: &Uuid) -> Option<Session> {
        self.sessions.write().await.remove(id)
    }

    /// Drop sessions with no activity since `cutoff`; returns their ids
    pub async fn evict_idle(&self, cutoff: DateTime<Utc>) -> Vec<Uuid> {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<Uuid> = sessions
            .values()
            .filter(|session| session.is_idle_since(cutoff))
            .map(|session| session.id)
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        expired
    }

    pub async fn contains(&self, id: &Uuid) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_get_remove() {
        let store = SessionStore::new();
        let id = store.create().await;

        assert!(store.contains(&id).await);
        assert_eq!(store.get(&id).await.unwrap().id, id);
        assert_eq!(store.len().await, 1);

        assert!(store.remove(&id).await.is_some());
        assert!(store.get(&id).await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_is_shared_between_clones() {
        let store = SessionStore::new();
        let id = store.create().await;
        let other = store.clone();

        let updated = other
            .update(&id, |session| {
                session.linkedin_url = "https://www.linkedin.com/in/jane".to_string();
                session.linkedin_url.len()
            })
            .await;
        assert_eq!(updated, Some(32));
        assert_eq!(
            store.get(&id).await.unwrap().linkedin_url,
            "https://www.linkedin.com/in/jane"
        );

        assert!(store.update(&Uuid::new_v4(), |_| ()).await.is_none());
    }

    #[tokio::test]
    async fn test_evict_idle_drops_only_expired_sessions() {
        let store = SessionStore::new();

        let mut stale = Session::new();
        stale.last_active = Utc::now() - chrono::Duration::hours(3);
        let stale_id = store.insert(stale).await;
        let fresh_id = store.create().await;

        let evicted = store
            .evict_idle(Utc::now() - chrono::Duration::hours(1))
            .await;

        assert_eq!(evicted, vec![stale_id]);
        assert!(store.get(&stale_id).await.is_none());
        assert!(store.contains(&fresh_id).await);
    }

    #[tokio::test]
    async fn test_update_refreshes_activity() {
        let store = SessionStore::new();
        let mut session = Session::new();
        session.last_active = Utc::now() - chrono::Duration::hours(3);
        let id = store.insert(session).await;

        store.update(&id, |_| ()).await;

        assert!(store
            .evict_idle(Utc::now() - chrono::Duration::hours(1))
            .await
            .is_empty());
    }
}
