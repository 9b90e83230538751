//! Redis-backed [`SessionStore`], the default durable backend.
//!
//! Sessions are stored as JSON strings under `duel:session:{id}`, join codes
//! under `duel:code:{code}`, both written with `SET ... EX` so the TTL is
//! refreshed on every write.

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dao::{
    models::SessionEntity,
    session_store::SessionStore,
    storage::{StorageError, StorageResult},
};

const SESSION_KEY_PREFIX: &str = "duel:session:";
const CODE_KEY_PREFIX: &str = "duel:code:";

/// Result alias for Redis backend operations.
pub type RedisResult<T> = Result<T, RedisDaoError>;

/// Errors raised by the Redis backend before being folded into [`StorageError`].
#[derive(Debug, Error)]
pub enum RedisDaoError {
    #[error("failed to parse Redis connection URL `{url}`")]
    InvalidUrl {
        url: String,
        #[source]
        source: redis::RedisError,
    },
    #[error("failed to connect to Redis")]
    Connect {
        #[source]
        source: redis::RedisError,
    },
    #[error("Redis command `{command}` failed")]
    Command {
        command: &'static str,
        #[source]
        source: redis::RedisError,
    },
}

impl From<RedisDaoError> for StorageError {
    fn from(err: RedisDaoError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}

/// Connection settings for the Redis session store.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://localhost:6379`.
    pub url: String,
}

/// Redis-backed implementation of the durable session store.
#[derive(Clone)]
pub struct RedisSessionStore {
    client: Client,
    connection: Arc<RwLock<MultiplexedConnection>>,
}

impl RedisSessionStore {
    /// Establish a connection to Redis and verify it with a ping.
    pub async fn connect(config: RedisConfig) -> RedisResult<Self> {
        let client = Client::open(config.url.as_str()).map_err(|source| {
            RedisDaoError::InvalidUrl {
                url: config.url.clone(),
                source,
            }
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|source| RedisDaoError::Connect { source })?;

        let store = Self {
            client,
            connection: Arc::new(RwLock::new(connection)),
        };
        store.ping().await?;
        Ok(store)
    }

    async fn connection(&self) -> MultiplexedConnection {
        self.connection.read().await.clone()
    }

    async fn ping(&self) -> RedisResult<()> {
        let mut connection = self.connection().await;
        redis::cmd("PING")
            .query_async::<()>(&mut connection)
            .await
            .map_err(|source| RedisDaoError::Command {
                command: "PING",
                source,
            })
    }

    async fn reconnect(&self) -> RedisResult<()> {
        let fresh = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|source| RedisDaoError::Connect { source })?;
        let mut guard = self.connection.write().await;
        *guard = fresh;
        Ok(())
    }

    fn session_key(id: Uuid) -> String {
        format!("{SESSION_KEY_PREFIX}{id}")
    }

    fn code_key(code: &str) -> String {
        format!("{CODE_KEY_PREFIX}{code}")
    }
}

impl SessionStore for RedisSessionStore {
    fn save_session(
        &self,
        session: SessionEntity,
        ttl: Duration,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let key = Self::session_key(session.id);
            let payload = serde_json::to_string(&session).map_err(|source| {
                StorageError::codec(format!("failed to serialize session `{}`", session.id), source)
            })?;

            let mut connection = store.connection().await;
            connection
                .set_ex::<_, _, ()>(key, payload, ttl.as_secs().max(1))
                .await
                .map_err(|source| RedisDaoError::Command {
                    command: "SET",
                    source,
                })?;
            Ok(())
        })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut connection = store.connection().await;
            let payload: Option<String> = connection
                .get(Self::session_key(id))
                .await
                .map_err(|source| RedisDaoError::Command {
                    command: "GET",
                    source,
                })?;

            match payload {
                Some(json) => {
                    let entity = serde_json::from_str(&json).map_err(|source| {
                        StorageError::codec(format!("failed to deserialize session `{id}`"), source)
                    })?;
                    Ok(Some(entity))
                }
                None => Ok(None),
            }
        })
    }

    fn delete_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut connection = store.connection().await;
            connection
                .del::<_, ()>(Self::session_key(id))
                .await
                .map_err(|source| RedisDaoError::Command {
                    command: "DEL",
                    source,
                })?;
            Ok(())
        })
    }

    fn save_join_code(
        &self,
        code: String,
        match_id: Uuid,
        ttl: Duration,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut connection = store.connection().await;
            connection
                .set_ex::<_, _, ()>(
                    Self::code_key(&code),
                    match_id.to_string(),
                    ttl.as_secs().max(1),
                )
                .await
                .map_err(|source| RedisDaoError::Command {
                    command: "SET",
                    source,
                })?;
            Ok(())
        })
    }

    fn find_join_code(&self, code: String) -> BoxFuture<'static, StorageResult<Option<Uuid>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut connection = store.connection().await;
            let payload: Option<String> = connection
                .get(Self::code_key(&code))
                .await
                .map_err(|source| RedisDaoError::Command {
                    command: "GET",
                    source,
                })?;

            match payload {
                Some(raw) => {
                    let id = raw.parse::<Uuid>().map_err(|source| {
                        StorageError::codec(format!("malformed match id under code `{code}`"), source)
                    })?;
                    Ok(Some(id))
                }
                None => Ok(None),
            }
        })
    }

    fn delete_join_code(&self, code: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut connection = store.connection().await;
            connection
                .del::<_, ()>(Self::code_key(&code))
                .await
                .map_err(|source| RedisDaoError::Command {
                    command: "DEL",
                    source,
                })?;
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.reconnect().await.map_err(Into::into) })
    }
}
