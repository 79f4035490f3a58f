//! Context retrieval: embed the query, pull nearest chunks, keep the ones
//! above the similarity threshold.

use common::error::AppError;

use crate::services::ChatServices;

/// A chunk that survived the similarity cut, ready for prompt assembly.
#[derive(Debug, Clone)]
pub struct RetrievedPassage {
    pub source_id: String,
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone, Default)]
pub struct RetrievedContext {
    pub passages: Vec<RetrievedPassage>,
}

impl RetrievedContext {
    /// Passage texts joined for the prompt; empty when nothing qualified.
    pub fn context_block(&self) -> String {
        self.passages
            .iter()
            .map(|passage| passage.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

/// Runs the retrieval leg for one query. Matches at or below `threshold` are
/// discarded; survivors are ordered best first regardless of how the index
/// returned them.
pub async fn retrieve_context(
    services: &dyn ChatServices,
    query: &str,
    top_k: usize,
    threshold: f32,
) -> Result<RetrievedContext, AppError> {
    let embedding = services.embed(query).await?;
    let matches = services.search_chunks(embedding, top_k).await?;

    let mut passages: Vec<RetrievedPassage> = matches
        .into_iter()
        .filter(|candidate| candidate.score > threshold)
        .map(|candidate| RetrievedPassage {
            source_id: candidate.source_id,
            text: candidate.chunk,
            score: candidate.score,
        })
        .collect();
    passages.sort_by(|a, b| b.score.total_cmp(&a.score));

    Ok(RetrievedContext { passages })
}
