use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use murmur_types::events::GatewayEvent;

/// One live realtime connection. Cloning shares the same outbound queue.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl SessionHandle {
    /// Create a handle and the receiver its connection drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue an event. Returns false once the connection has gone away.
    pub fn send(&self, event: GatewayEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Which sessions each user currently has open. Process-local; everything
/// here is lost on restart and rebuilt as clients reconnect and join again.
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    inner: Arc<RwLock<HashMap<Uuid, HashMap<Uuid, SessionHandle>>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session for `user_id`. Returns false if it was already registered.
    pub async fn register(&self, user_id: Uuid, handle: SessionHandle) -> bool {
        let mut users = self.inner.write().await;
        let sessions = users.entry(user_id).or_default();
        if sessions.contains_key(&handle.id) {
            return false;
        }
        sessions.insert(handle.id, handle);
        true
    }

    /// Remove a session. Drops the user's entry when it was the last one.
    pub async fn unregister(&self, user_id: Uuid, session_id: Uuid) -> bool {
        let mut users = self.inner.write().await;
        let Some(sessions) = users.get_mut(&user_id) else {
            return false;
        };
        let removed = sessions.remove(&session_id).is_some();
        if sessions.is_empty() {
            users.remove(&user_id);
        }
        removed
    }

    pub async fn sessions_for(&self, user_id: Uuid) -> Vec<SessionHandle> {
        self.inner
            .read()
            .await
            .get(&user_id)
            .map(|sessions| sessions.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.read().await.contains_key(&user_id)
    }

    /// Number of users with at least one session.
    pub async fn online_users(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_is_idempotent() {
        let registry = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let (handle, _rx) = SessionHandle::new();

        assert!(registry.register(user, handle.clone()).await);
        assert!(!registry.register(user, handle.clone()).await);
        assert_eq!(registry.sessions_for(user).await.len(), 1);
    }

    #[tokio::test]
    async fn last_unregister_removes_the_user() {
        let registry = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let (first, _rx1) = SessionHandle::new();
        let (second, _rx2) = SessionHandle::new();

        registry.register(user, first.clone()).await;
        registry.register(user, second.clone()).await;
        assert_eq!(registry.sessions_for(user).await.len(), 2);

        assert!(registry.unregister(user, first.id()).await);
        assert!(registry.is_online(user).await);
        assert!(registry.unregister(user, second.id()).await);
        assert!(!registry.is_online(user).await);
        assert_eq!(registry.online_users().await, 0);

        assert!(!registry.unregister(user, second.id()).await);
        assert!(registry.sessions_for(user).await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_registration_keeps_every_session() {
        let registry = PresenceRegistry::new();
        let user = Uuid::new_v4();

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let (handle, rx) = SessionHandle::new();
                registry.register(user, handle.clone()).await;
                (handle, rx)
            }));
        }
        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }
        assert_eq!(registry.sessions_for(user).await.len(), 32);

        let mut tasks = Vec::new();
        for (handle, _) in &handles {
            let registry = registry.clone();
            let id = handle.id();
            tasks.push(tokio::spawn(async move { registry.unregister(user, id).await }));
        }
        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert!(!registry.is_online(user).await);
    }

    #[tokio::test]
    async fn send_fails_after_receiver_drops() {
        let (handle, rx) = SessionHandle::new();
        assert!(handle.send(GatewayEvent::Error { message: "x".into() }));
        drop(rx);
        assert!(!handle.send(GatewayEvent::Error { message: "x".into() }));
    }
}
