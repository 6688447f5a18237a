use sqlx::Row;

use concierge_core::domain::knowledge::{PolicyCollection, PolicyDocument};

use super::{KnowledgeRepository, RepositoryError};
use crate::DbPool;

/// Policy documents stored as JSON rows keyed by collection.
pub struct SqlKnowledgeRepository {
    pool: DbPool,
}

impl SqlKnowledgeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl KnowledgeRepository for SqlKnowledgeRepository {
    async fn list_collection(
        &self,
        collection: PolicyCollection,
    ) -> Result<Vec<PolicyDocument>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, title, body, metadata_json FROM policy_document WHERE collection = ?1",
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<PolicyDocument, RepositoryError> {
                let id: String = row.try_get("id")?;
                let metadata_json: String = row.try_get("metadata_json")?;
                let metadata = serde_json::from_str(&metadata_json).map_err(|error| {
                    RepositoryError::Decode(format!(
                        "policy document `{id}` has invalid metadata_json: {error}"
                    ))
                })?;

                Ok(PolicyDocument {
                    id,
                    collection,
                    title: row.try_get("title")?,
                    body: row.try_get("body")?,
                    metadata,
                })
            })
            .collect()
    }
}
