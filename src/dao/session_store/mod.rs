//! Durable session store: the single source of truth shared by all workers.

pub mod memory;
#[cfg(feature = "redis-store")]
pub mod redis;

use std::time::Duration;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{models::SessionEntity, storage::StorageResult};

/// Abstraction over the TTL-backed key/value store holding serialized sessions.
///
/// Every write refreshes the entry's TTL so orphaned sessions eventually
/// expire on their own.
pub trait SessionStore: Send + Sync {
    /// Persist the full serialized session under its match id.
    fn save_session(
        &self,
        session: SessionEntity,
        ttl: Duration,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Read a serialized session back, `None` when the key is absent or expired.
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Drop a session key.
    fn delete_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>>;
    /// Persist the join-code lookup entry for a match.
    fn save_join_code(
        &self,
        code: String,
        match_id: Uuid,
        ttl: Duration,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Resolve a join code to a match id.
    fn find_join_code(&self, code: String) -> BoxFuture<'static, StorageResult<Option<Uuid>>>;
    /// Drop a join-code lookup entry.
    fn delete_join_code(&self, code: String) -> BoxFuture<'static, StorageResult<()>>;
    /// Cheap liveness probe against the backend.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Attempt to re-establish a broken backend connection.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
