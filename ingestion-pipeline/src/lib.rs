//! Document ingestion: extract text from an upload, chunk it, embed the
//! chunks, and persist document plus vectors for retrieval.

pub mod chunker;
pub mod extract;

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{info, instrument};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{document::Document, text_chunk::TextChunk},
    },
    utils::{config::AppConfig, embedding::EmbeddingProvider},
};

use crate::chunker::chunk_text;

/// Vector writes go out in fixed-size batches so one large document cannot
/// hold a single transaction open for its whole chunk list.
const UPSERT_BATCH_SIZE: usize = 100;

/// An uploaded file awaiting ingestion. `file_type` is the file extension,
/// matched case-insensitively.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub title: String,
    pub category: String,
    pub file_type: String,
    pub bytes: Vec<u8>,
    pub uploaded_by: String,
}

/// What a completed ingestion produced.
#[derive(Debug, Clone)]
pub struct IngestionOutcome {
    pub document: Document,
    pub chunk_count: usize,
}

pub struct IngestionPipeline {
    db: Arc<SurrealDbClient>,
    embeddings: EmbeddingProvider,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl IngestionPipeline {
    pub fn new(
        db: Arc<SurrealDbClient>,
        embeddings: EmbeddingProvider,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        IngestionPipeline {
            db,
            embeddings,
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        db: Arc<SurrealDbClient>,
        embeddings: EmbeddingProvider,
    ) -> Self {
        Self::new(db, embeddings, config.chunk_size, config.chunk_overlap)
    }

    /// Runs the full ingestion flow for one upload. The document row is
    /// written before its vectors; chunk ids are derived from the document id
    /// and position, so a retried ingestion of the same document overwrites
    /// rather than duplicates.
    #[instrument(skip(self, upload), fields(title = %upload.title, file_type = %upload.file_type))]
    pub async fn ingest(&self, upload: FileUpload) -> Result<IngestionOutcome, AppError> {
        let FileUpload {
            title,
            category,
            file_type,
            bytes,
            uploaded_by,
        } = upload;

        let size_bytes = bytes.len() as i64;

        // PDF and DOCX parsing is CPU-bound; keep it off the async runtime.
        let extraction_format = file_type.clone();
        let (chunk_size, chunk_overlap) = (self.chunk_size, self.chunk_overlap);
        let (text, chunks) = tokio::task::spawn_blocking(move || {
            let text = extract::extract_text(&extraction_format, &bytes)?;
            let chunks = chunk_text(&text, chunk_size, chunk_overlap);
            Ok::<_, AppError>((text, chunks))
        })
        .await??;

        let document = Document::new(
            title,
            text,
            category,
            size_bytes,
            file_type.trim_start_matches('.').to_lowercase(),
            uploaded_by,
        );
        self.db.store_item(document.clone()).await?;

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embeddings.embed_batch(texts).await?;

        let records: Vec<TextChunk> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                TextChunk::new(
                    document.id.clone(),
                    chunk.index as i64,
                    chunk.text,
                    embedding,
                )
            })
            .collect();

        let chunk_count = records.len();
        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            try_join_all(
                batch
                    .iter()
                    .cloned()
                    .map(|record| self.db.upsert_item(record)),
            )
            .await?;
        }

        info!(
            document_id = %document.id,
            chunk_count,
            "document ingested"
        );

        Ok(IngestionOutcome {
            document,
            chunk_count,
        })
    }

    /// Removes a document and every vector derived from it. Vectors go first
    /// so a failure cannot leave chunks pointing at a missing document row.
    #[instrument(skip(self))]
    pub async fn delete_document(&self, document_id: &str) -> Result<Document, AppError> {
        let document: Document = self
            .db
            .get_item(document_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("document {document_id}")))?;

        TextChunk::delete_by_source_id(document_id, &self.db).await?;
        self.db.delete_item::<Document>(document_id).await?;

        info!(document_id, "document deleted");
        Ok(document)
    }
}
