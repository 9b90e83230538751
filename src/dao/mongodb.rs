//! MongoDB connection management for the question bank and the result sink.

use mongodb::{Client, Database, bson::doc, error::Error as MongoError, options::ClientOptions};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{sync::RwLock, time::sleep};
use tracing::warn;

const DEFAULT_DB: &str = "quiz_duel";
const MAX_CONNECT_ATTEMPTS: u32 = 10;
const BASE_RETRY_DELAY_MS: u64 = 250;

/// Shared handle to a MongoDB connection that can be refreshed in place.
#[derive(Clone)]
pub struct MongoManager {
    inner: Arc<MongoManagerInner>,
}

struct MongoManagerInner {
    state: RwLock<MongoState>,
    options: ClientOptions,
    database_name: String,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

type Result<T> = std::result::Result<T, MongoDaoError>;

/// Errors raised while talking to MongoDB.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
}

/// Connect to MongoDB, retrying the initial ping with linear backoff.
pub async fn connect(uri: &str, db_name: Option<&str>) -> Result<MongoManager> {
    let database_name = db_name.unwrap_or(DEFAULT_DB).to_owned();
    let options = ClientOptions::parse(uri)
        .await
        .map_err(|source| MongoDaoError::InvalidUri {
            uri: uri.to_owned(),
            source,
        })?;

    let (client, database) = establish_connection(&options, &database_name).await?;

    let inner = Arc::new(MongoManagerInner {
        state: RwLock::new(MongoState { client, database }),
        options,
        database_name,
    });

    Ok(MongoManager { inner })
}

/// Ensure the indexes required by the result sink are present.
pub async fn ensure_indexes(database: &Database) -> Result<()> {
    let collection = database.collection::<mongodb::bson::Document>("player_results");
    let model = mongodb::IndexModel::builder()
        .keys(doc! {"match_id": 1, "user_id": 1})
        .options(
            mongodb::options::IndexOptions::builder()
                .name(Some("player_result_idx".to_string()))
                .unique(Some(true))
                .build(),
        )
        .build();
    collection
        .create_index(model)
        .await
        .map_err(|source| MongoDaoError::EnsureIndex {
            collection: "player_results",
            index: "match_id,user_id",
            source,
        })?;
    Ok(())
}

impl MongoManager {
    /// Clone the current database handle.
    pub async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    /// Issue a ping against the current MongoDB connection.
    pub async fn ping(&self) -> Result<()> {
        let database = self.database().await;
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    /// Replace the underlying connection with a fresh one.
    pub async fn reconnect(&self) -> Result<()> {
        let (client, database) =
            establish_connection(&self.inner.options, &self.inner.database_name).await?;
        let mut guard = self.inner.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

async fn establish_connection(
    options: &ClientOptions,
    database_name: &str,
) -> Result<(Client, Database)> {
    let client = Client::with_options(options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(database_name);

    let mut attempt = 0;
    loop {
        attempt += 1;
        match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => return Ok((client, database)),
            Err(source) if attempt >= MAX_CONNECT_ATTEMPTS => {
                return Err(MongoDaoError::InitialPing {
                    attempts: attempt,
                    source,
                });
            }
            Err(err) => {
                warn!(attempt, error = %err, "MongoDB ping failed; retrying");
                sleep(Duration::from_millis(BASE_RETRY_DELAY_MS * u64::from(attempt))).await;
            }
        }
    }
}
