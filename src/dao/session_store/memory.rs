//! In-process session store used by tests and storage-less development runs.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::future::BoxFuture;
use std::sync::Arc;
use uuid::Uuid;

use crate::dao::{models::SessionEntity, session_store::SessionStore, storage::StorageResult};

/// TTL-aware in-memory [`SessionStore`].
///
/// Entries are expired lazily on read; there is no background sweeper.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<DashMap<Uuid, (SessionEntity, Instant)>>,
    codes: Arc<DashMap<String, (Uuid, Instant)>>,
}

impl MemorySessionStore {
    /// Build an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) sessions currently held.
    pub fn session_count(&self) -> usize {
        let now = Instant::now();
        self.sessions
            .iter()
            .filter(|entry| entry.value().1 > now)
            .count()
    }
}

impl SessionStore for MemorySessionStore {
    fn save_session(
        &self,
        session: SessionEntity,
        ttl: Duration,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let sessions = self.sessions.clone();
        Box::pin(async move {
            sessions.insert(session.id, (session, Instant::now() + ttl));
            Ok(())
        })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let sessions = self.sessions.clone();
        Box::pin(async move {
            if let Some(entry) = sessions.get(&id) {
                if entry.value().1 > Instant::now() {
                    return Ok(Some(entry.value().0.clone()));
                }
            }
            // Lazy expiry: the shard guard above is released before removal.
            sessions.remove(&id);
            Ok(None)
        })
    }

    fn delete_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let sessions = self.sessions.clone();
        Box::pin(async move {
            sessions.remove(&id);
            Ok(())
        })
    }

    fn save_join_code(
        &self,
        code: String,
        match_id: Uuid,
        ttl: Duration,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let codes = self.codes.clone();
        Box::pin(async move {
            codes.insert(code, (match_id, Instant::now() + ttl));
            Ok(())
        })
    }

    fn find_join_code(&self, code: String) -> BoxFuture<'static, StorageResult<Option<Uuid>>> {
        let codes = self.codes.clone();
        Box::pin(async move {
            if let Some(entry) = codes.get(&code) {
                if entry.value().1 > Instant::now() {
                    return Ok(Some(entry.value().0));
                }
            }
            codes.remove(&code);
            Ok(None)
        })
    }

    fn delete_join_code(&self, code: String) -> BoxFuture<'static, StorageResult<()>> {
        let codes = self.codes.clone();
        Box::pin(async move {
            codes.remove(&code);
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::MatchStatusEntity;
    use std::time::SystemTime;

    fn entity(id: Uuid) -> SessionEntity {
        SessionEntity {
            id,
            join_code: Some("AB12CD".into()),
            quiz_id: Uuid::new_v4(),
            questions: Vec::new(),
            status: MatchStatusEntity::Waiting,
            current_index: 0,
            presented_at: None,
            players: Vec::new(),
            created_at: SystemTime::now(),
            updated_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn save_find_delete_round_trip() {
        let store = MemorySessionStore::new();
        let id = Uuid::new_v4();

        store
            .save_session(entity(id), Duration::from_secs(60))
            .await
            .unwrap();
        let found = store.find_session(id).await.unwrap();
        assert_eq!(found.map(|entity| entity.id), Some(id));

        store.delete_session(id).await.unwrap();
        assert!(store.find_session(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_dropped_on_read() {
        let store = MemorySessionStore::new();
        let id = Uuid::new_v4();

        store
            .save_session(entity(id), Duration::ZERO)
            .await
            .unwrap();
        assert!(store.find_session(id).await.unwrap().is_none());
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn join_codes_resolve_to_match_ids() {
        let store = MemorySessionStore::new();
        let id = Uuid::new_v4();

        store
            .save_join_code("AB12CD".into(), id, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.find_join_code("AB12CD".into()).await.unwrap(), Some(id));
        assert_eq!(store.find_join_code("ZZZZZZ".into()).await.unwrap(), None);

        store.delete_join_code("AB12CD".into()).await.unwrap();
        assert_eq!(store.find_join_code("AB12CD".into()).await.unwrap(), None);
    }
}
