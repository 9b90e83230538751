//! Long-term result sink consumed at match completion.

use dashmap::DashMap;
use futures::future::BoxFuture;
use std::sync::Arc;
use uuid::Uuid;

use crate::dao::{models::MatchRecordEntity, storage::StorageResult};

/// Write-once sink for completed-match results.
///
/// Upserts are keyed by match id (and match id + participant id for player
/// rows) so re-delivery after a retry stays idempotent.
pub trait ResultSink: Send + Sync {
    /// Upsert the match record and its per-player result rows.
    fn record_match(&self, record: MatchRecordEntity) -> BoxFuture<'static, StorageResult<()>>;
}

/// In-memory [`ResultSink`] used by tests to observe completion records.
#[derive(Clone, Default)]
pub struct MemoryResultSink {
    records: Arc<DashMap<Uuid, MatchRecordEntity>>,
}

impl MemoryResultSink {
    /// Build an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the recorded result for a match, if any.
    pub fn record_for(&self, match_id: Uuid) -> Option<MatchRecordEntity> {
        self.records.get(&match_id).map(|entry| entry.value().clone())
    }

    /// Number of distinct matches recorded.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no match has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ResultSink for MemoryResultSink {
    fn record_match(&self, record: MatchRecordEntity) -> BoxFuture<'static, StorageResult<()>> {
        let records = self.records.clone();
        Box::pin(async move {
            records.insert(record.match_id, record);
            Ok(())
        })
    }
}

#[cfg(feature = "mongo-bank")]
pub use self::mongo::MongoResultSink;

#[cfg(feature = "mongo-bank")]
mod mongo {
    use futures::future::BoxFuture;
    use mongodb::bson::{Binary, DateTime, Document, doc, spec::BinarySubtype};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    use crate::dao::{
        models::{MatchRecordEntity, PlayerResultEntity},
        mongodb::MongoManager,
        storage::{StorageError, StorageResult},
    };

    use super::ResultSink;

    const MATCH_COLLECTION_NAME: &str = "match_results";
    const PLAYER_COLLECTION_NAME: &str = "player_results";

    #[derive(Debug, Serialize, Deserialize)]
    struct MatchResultDocument {
        #[serde(rename = "_id")]
        id: Uuid,
        quiz_id: Uuid,
        completed_at: DateTime,
        winner: Option<Uuid>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct PlayerResultDocument {
        match_id: Uuid,
        user_id: Uuid,
        username: String,
        total_score: u32,
        correct_count: u32,
        total_time_secs: f64,
        accuracy_pct: f64,
        winner: bool,
    }

    impl From<(Uuid, PlayerResultEntity)> for PlayerResultDocument {
        fn from((match_id, entity): (Uuid, PlayerResultEntity)) -> Self {
            Self {
                match_id,
                user_id: entity.user_id,
                username: entity.username,
                total_score: entity.total_score,
                correct_count: entity.correct_count as u32,
                total_time_secs: entity.total_time_secs,
                accuracy_pct: entity.accuracy_pct,
                winner: entity.winner,
            }
        }
    }

    fn uuid_as_binary(id: Uuid) -> Binary {
        Binary {
            subtype: BinarySubtype::Uuid,
            bytes: id.into_bytes().to_vec(),
        }
    }

    fn doc_id(id: Uuid) -> Document {
        doc! {"_id": uuid_as_binary(id)}
    }

    /// [`ResultSink`] upserting into the MongoDB history collections.
    #[derive(Clone)]
    pub struct MongoResultSink {
        manager: MongoManager,
    }

    impl MongoResultSink {
        /// Wrap an established MongoDB connection.
        pub fn new(manager: MongoManager) -> Self {
            Self { manager }
        }
    }

    impl ResultSink for MongoResultSink {
        fn record_match(&self, record: MatchRecordEntity) -> BoxFuture<'static, StorageResult<()>> {
            let manager = self.manager.clone();
            Box::pin(async move {
                let database = manager.database().await;
                let match_id = record.match_id;

                let player_collection =
                    database.collection::<PlayerResultDocument>(PLAYER_COLLECTION_NAME);
                for player in record.players.iter().cloned() {
                    let document = PlayerResultDocument::from((match_id, player));
                    player_collection
                        .replace_one(
                            doc! {
                                "match_id": uuid_as_binary(document.match_id),
                                "user_id": uuid_as_binary(document.user_id),
                            },
                            &document,
                        )
                        .upsert(true)
                        .await
                        .map_err(|source| {
                            StorageError::unavailable(
                                format!("failed to upsert player result for `{match_id}`"),
                                source,
                            )
                        })?;
                }

                let document = MatchResultDocument {
                    id: match_id,
                    quiz_id: record.quiz_id,
                    completed_at: DateTime::from_system_time(record.completed_at),
                    winner: record.winner,
                };
                database
                    .collection::<MatchResultDocument>(MATCH_COLLECTION_NAME)
                    .replace_one(doc_id(match_id), &document)
                    .upsert(true)
                    .await
                    .map_err(|source| {
                        StorageError::unavailable(
                            format!("failed to upsert match result `{match_id}`"),
                            source,
                        )
                    })?;

                Ok(())
            })
        }
    }
}
