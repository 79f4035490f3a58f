use std::sync::Arc;

use chat_pipeline::ChatPipeline;
use common::{storage::db::SurrealDbClient, utils::config::AppConfig};
use ingestion_pipeline::IngestionPipeline;

/// Shared state handed to every API handler.
#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub chat: Arc<ChatPipeline>,
    pub ingestion: Arc<IngestionPipeline>,
}

impl ApiState {
    pub fn new(
        db: Arc<SurrealDbClient>,
        config: AppConfig,
        chat: Arc<ChatPipeline>,
        ingestion: Arc<IngestionPipeline>,
    ) -> Self {
        Self {
            db,
            config,
            chat,
            ingestion,
        }
    }
}
