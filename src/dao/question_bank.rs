//! Content resolution: mapping a quiz id to its ordered immutable question list.

use dashmap::DashMap;
use futures::future::BoxFuture;
use std::sync::Arc;
use uuid::Uuid;

use crate::dao::{models::QuestionEntity, storage::StorageResult};

/// Collaborator that resolves a quiz id into its question list.
///
/// Resolution is idempotent: content never changes once a quiz is published,
/// which is what makes re-resolution during rehydration safe.
pub trait QuestionBank: Send + Sync {
    /// Look up the ordered question list for `quiz_id`, `None` when unknown.
    fn resolve_quiz(
        &self,
        quiz_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<Vec<QuestionEntity>>>>;
}

/// One quiz entry of a fixture file consumed by [`StaticQuestionBank`].
#[derive(Debug, serde::Deserialize)]
pub struct QuizFixture {
    /// Quiz identifier clients create matches with.
    pub id: Uuid,
    /// Ordered question list.
    pub questions: Vec<QuestionEntity>,
}

/// Fixture-backed [`QuestionBank`] used by tests and storage-less dev runs.
#[derive(Clone, Default)]
pub struct StaticQuestionBank {
    quizzes: Arc<DashMap<Uuid, Vec<QuestionEntity>>>,
}

impl StaticQuestionBank {
    /// Build an empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a quiz fixture.
    pub fn insert(&self, quiz_id: Uuid, questions: Vec<QuestionEntity>) {
        self.quizzes.insert(quiz_id, questions);
    }

    /// Build a bank from parsed fixture entries.
    pub fn from_fixtures(fixtures: Vec<QuizFixture>) -> Self {
        let bank = Self::new();
        for fixture in fixtures {
            bank.insert(fixture.id, fixture.questions);
        }
        bank
    }
}

impl QuestionBank for StaticQuestionBank {
    fn resolve_quiz(
        &self,
        quiz_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<Vec<QuestionEntity>>>> {
        let quizzes = self.quizzes.clone();
        Box::pin(async move { Ok(quizzes.get(&quiz_id).map(|entry| entry.value().clone())) })
    }
}

#[cfg(feature = "mongo-bank")]
pub use self::mongo::MongoQuestionBank;

#[cfg(feature = "mongo-bank")]
mod mongo {
    use futures::future::BoxFuture;
    use mongodb::bson::{Binary, Document, doc, spec::BinarySubtype};
    use serde::Deserialize;
    use uuid::Uuid;

    use crate::dao::{
        models::QuestionEntity,
        mongodb::MongoManager,
        storage::{StorageError, StorageResult},
    };

    use super::QuestionBank;

    const QUIZ_COLLECTION_NAME: &str = "quizzes";

    /// Published quiz document as stored by the content-management side.
    #[derive(Debug, Deserialize)]
    struct QuizDocument {
        #[serde(rename = "_id")]
        #[allow(dead_code)]
        id: Uuid,
        questions: Vec<QuestionEntity>,
    }

    fn doc_id(id: Uuid) -> Document {
        doc! {"_id": Binary {
            subtype: BinarySubtype::Uuid,
            bytes: id.into_bytes().to_vec(),
        }}
    }

    /// [`QuestionBank`] reading the published quiz collection in MongoDB.
    #[derive(Clone)]
    pub struct MongoQuestionBank {
        manager: MongoManager,
    }

    impl MongoQuestionBank {
        /// Wrap an established MongoDB connection.
        pub fn new(manager: MongoManager) -> Self {
            Self { manager }
        }
    }

    impl QuestionBank for MongoQuestionBank {
        fn resolve_quiz(
            &self,
            quiz_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<Vec<QuestionEntity>>>> {
            let manager = self.manager.clone();
            Box::pin(async move {
                let database = manager.database().await;
                let collection = database.collection::<QuizDocument>(QUIZ_COLLECTION_NAME);
                let document = collection.find_one(doc_id(quiz_id)).await.map_err(|source| {
                    StorageError::unavailable(
                        format!("failed to load quiz `{quiz_id}`"),
                        source,
                    )
                })?;
                Ok(document.map(|quiz| quiz.questions))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_bank_resolves_registered_quizzes() {
        let bank = StaticQuestionBank::new();
        let quiz_id = Uuid::new_v4();
        bank.insert(quiz_id, Vec::new());

        assert!(bank.resolve_quiz(quiz_id).await.unwrap().is_some());
        assert!(bank.resolve_quiz(Uuid::new_v4()).await.unwrap().is_none());
    }
}
