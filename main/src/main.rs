use std::sync::Arc;

use api_router::{api_routes_v1, api_state::ApiState};
use axum::Router;
use chat_pipeline::{ChatPipeline, ChatServices, OpenAiChatServices, PipelineConfig};
use common::{
    storage::db::SurrealDbClient,
    utils::{config::get_config, embedding::EmbeddingProvider},
};
use ingestion_pipeline::IngestionPipeline;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );

    // Ensure indexes exist before anything queries them
    db.ensure_initialized(config.embedding_dimensions as usize)
        .await?;

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));

    let embedding_provider = EmbeddingProvider::from_config(&config, openai_client.clone());
    info!(
        embedding_model = %config.embedding_model,
        embedding_dimension = embedding_provider.dimension(),
        "Embedding provider initialized"
    );

    let services: Arc<dyn ChatServices> = Arc::new(OpenAiChatServices::from_config(
        &config,
        openai_client,
        db.clone(),
        embedding_provider.clone(),
    ));

    let chat = Arc::new(ChatPipeline::new(
        db.clone(),
        services,
        PipelineConfig::from_app_config(&config),
    ));
    let ingestion = Arc::new(IngestionPipeline::from_config(
        &config,
        db.clone(),
        embedding_provider,
    ));

    let api_state = ApiState::new(db, config.clone(), chat, ingestion);

    // Create Axum router
    let app = Router::new()
        .nest("/api/v1", api_routes_v1(&api_state))
        .with_state(api_state);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use common::utils::config::AppConfig;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn smoke_test_config() -> AppConfig {
        AppConfig {
            openai_api_key: "test-key".into(),
            openai_base_url: "https://example.com".into(),
            surrealdb_address: "mem://".into(),
            surrealdb_username: "root".into(),
            surrealdb_password: "root".into(),
            surrealdb_namespace: "test_ns".into(),
            surrealdb_database: "test_db".into(),
            http_port: 0,
            chat_model: "gpt-4-turbo-preview".into(),
            gate_model: "gpt-3.5-turbo".into(),
            embedding_model: "text-embedding-3-large".into(),
            embedding_dimensions: 8,
            chunk_size: 1000,
            chunk_overlap: 200,
            retrieval_top_k: 5,
            similarity_threshold: 0.7,
            history_window: 10,
            call_timeout_secs: 30,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }

    async fn smoke_test_router() -> Router {
        let config = smoke_test_config();
        let database = format!("test_db_{}", Uuid::new_v4());
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &database)
                .await
                .expect("failed to start in-memory surrealdb"),
        );
        db.ensure_initialized(config.embedding_dimensions as usize)
            .await
            .expect("failed to initialize indexes");

        let openai_client = Arc::new(async_openai::Client::with_config(
            async_openai::config::OpenAIConfig::new()
                .with_api_key(&config.openai_api_key)
                .with_api_base(&config.openai_base_url),
        ));

        // Hashed embeddings keep the smoke test off the network
        let embedding_provider = EmbeddingProvider::new_hashed(8);

        let services: Arc<dyn ChatServices> = Arc::new(OpenAiChatServices::from_config(
            &config,
            openai_client,
            db.clone(),
            embedding_provider.clone(),
        ));
        let chat = Arc::new(ChatPipeline::new(
            db.clone(),
            services,
            PipelineConfig::from_app_config(&config),
        ));
        let ingestion = Arc::new(IngestionPipeline::from_config(
            &config,
            db.clone(),
            embedding_provider,
        ));

        let api_state = ApiState::new(db, config, chat, ingestion);

        Router::new()
            .nest("/api/v1", api_routes_v1(&api_state))
            .with_state(api_state)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn smoke_startup_with_in_memory_surrealdb() {
        let app = smoke_test_router().await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/live")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);

        let ready_response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/ready")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("ready response");
        assert_eq!(ready_response.status(), StatusCode::OK);

        let documents_response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/documents")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("documents response");
        assert_eq!(documents_response.status(), StatusCode::OK);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn smoke_chat_rejects_empty_message() {
        let app = smoke_test_router().await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({ "message": "   " }).to_string(),
                    ))
                    .expect("request"),
            )
            .await
            .expect("chat response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
