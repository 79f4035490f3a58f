use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(TextChunk, "text_chunk", {
    source_id: String,
    chunk_index: i64,
    chunk: String,
    embedding: Vec<f32>
});

/// One nearest-neighbor hit from the vector index. Scores are cosine
/// similarity in [-1, 1]; the embedding itself is not pulled back.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ChunkMatch {
    #[serde(deserialize_with = "crate::storage::types::deserialize_flexible_id")]
    pub id: String,
    pub source_id: String,
    pub chunk: String,
    pub score: f32,
}

impl TextChunk {
    /// Vector ids are deterministic per document and position so re-ingesting
    /// a document overwrites its previous vectors instead of duplicating them.
    pub fn new(source_id: String, chunk_index: i64, chunk: String, embedding: Vec<f32>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("{source_id}_chunk_{chunk_index}"),
            created_at: now,
            updated_at: now,
            source_id,
            chunk_index,
            chunk,
            embedding,
        }
    }

    pub async fn delete_by_source_id(
        source_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query(format!(
                "DELETE {} WHERE source_id = $source_id",
                Self::table_name()
            ))
            .bind(("source_id", source_id.to_string()))
            .await?;

        Ok(())
    }

    /// K-nearest-neighbor search over the HNSW index, best match first.
    pub async fn find_similar(
        embedding: Vec<f32>,
        top_k: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<ChunkMatch>, AppError> {
        let matches: Vec<ChunkMatch> = db
            .client
            .query(format!(
                "SELECT id, source_id, chunk, \
                 vector::similarity::cosine(embedding, $embedding) AS score \
                 FROM {} WHERE embedding <|{top_k},40|> $embedding ORDER BY score DESC",
                Self::table_name()
            ))
            .bind(("embedding", embedding))
            .await?
            .take(0)?;

        Ok(matches)
    }
}
