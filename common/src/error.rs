use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Extraction failed for {format}: {cause}")]
    Extraction { format: String, cause: String },
    #[error("Embedding failed: {0}")]
    Embedding(String),
    #[error("Retrieval failed: {0}")]
    Retrieval(String),
    #[error("Generation failed: {0}")]
    Generation(String),
    #[error("LLM parsing error: {0}")]
    LLMParsing(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Timed out calling {0}")]
    Timeout(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn extraction(format: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Extraction {
            format: format.into(),
            cause: cause.to_string(),
        }
    }
}
