//! Retrieval-augmented chat pipeline: domain gate, context retrieval,
//! history assembly, and response synthesis behind a single entry point.

pub mod gate;
pub mod history;
pub mod retriever;
pub mod services;
pub mod synthesizer;

use std::{future::Future, sync::Arc, time::Duration, time::Instant};

use chrono::{DateTime, Utc};
use tokio::time::timeout;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            analytics::QueryAnalytics,
            chat_turn::{ChatMode, ChatTurn},
        },
    },
    utils::config::AppConfig,
};

pub use services::{ChatServices, OpenAiChatServices};
pub use synthesizer::DiscussionPart;

/// Canned reply for queries the gate rules out of the tutoring domain.
pub const OFF_TOPIC_RESPONSE: &str = "I specialize in topics related to Chartered Accountancy. Please ask a question about accounting, tax, audit, or other CA subjects.";

/// One incoming chat message, deserialized straight from the HTTP body.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub mode: ChatMode,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

fn default_language() -> String {
    "en".to_string()
}

/// Everything a handled request produced. `discussion` is populated only in
/// discussion mode.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineResult {
    pub response: String,
    pub mode: ChatMode,
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discussion: Option<Vec<DiscussionPart>>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub history_window: usize,
    pub call_timeout: Duration,
}

impl PipelineConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        PipelineConfig {
            top_k: config.retrieval_top_k,
            similarity_threshold: config.similarity_threshold,
            history_window: config.history_window,
            call_timeout: Duration::from_secs(config.call_timeout_secs),
        }
    }
}

pub struct ChatPipeline {
    db: Arc<SurrealDbClient>,
    services: Arc<dyn ChatServices>,
    config: PipelineConfig,
}

impl ChatPipeline {
    pub fn new(
        db: Arc<SurrealDbClient>,
        services: Arc<dyn ChatServices>,
        config: PipelineConfig,
    ) -> Self {
        ChatPipeline {
            db,
            services,
            config,
        }
    }

    /// Handles one chat request end to end. Every request leaves exactly one
    /// analytics row behind, whether the pipeline succeeded or not; a chat
    /// turn is persisted only for responses the user actually received.
    #[instrument(skip(self, request), fields(mode = %request.mode))]
    pub async fn handle(
        &self,
        user_id: &str,
        request: ChatRequest,
    ) -> Result<PipelineResult, AppError> {
        let started = Instant::now();
        let outcome = self.respond(user_id, &request).await;
        let elapsed_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

        // Latency observations must not turn a served answer into an error.
        if let Err(err) = QueryAnalytics::record(&request.message, elapsed_ms, &self.db).await {
            warn!(error = %err, "failed to record query analytics");
        }

        outcome
    }

    async fn respond(
        &self,
        user_id: &str,
        request: &ChatRequest,
    ) -> Result<PipelineResult, AppError> {
        let in_domain = match timeout(
            self.config.call_timeout,
            gate::is_in_domain(self.services.as_ref(), &request.message),
        )
        .await
        {
            Ok(verdict) => verdict,
            Err(_) => {
                warn!("domain classifier timed out, letting query through");
                true
            }
        };

        let conversation_id = request
            .conversation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if !in_domain {
            self.persist_turn(user_id, &conversation_id, request, OFF_TOPIC_RESPONSE)
                .await?;
            info!(conversation_id, "query refused as off-topic");
            return Ok(PipelineResult {
                response: OFF_TOPIC_RESPONSE.to_string(),
                mode: request.mode,
                conversation_id,
                timestamp: Utc::now(),
                discussion: None,
            });
        }

        let context = self
            .with_timeout(
                "context retrieval",
                retriever::retrieve_context(
                    self.services.as_ref(),
                    &request.message,
                    self.config.top_k,
                    self.config.similarity_threshold,
                ),
            )
            .await?;
        let context_block = context.context_block();

        match request.mode {
            ChatMode::Discussion => {
                let completion = synthesizer::discussion_request(&request.message, &context_block);
                let raw = self
                    .with_timeout("discussion generation", self.services.complete(completion))
                    .await?;
                let parts = synthesizer::parse_discussion(&raw);
                let transcript = synthesizer::render_discussion(&parts);

                self.persist_turn(user_id, &conversation_id, request, &transcript)
                    .await?;
                info!(
                    conversation_id,
                    passages = context.passages.len(),
                    speakers = parts.len(),
                    "discussion generated"
                );

                Ok(PipelineResult {
                    response: transcript,
                    mode: request.mode,
                    conversation_id,
                    timestamp: Utc::now(),
                    discussion: Some(parts),
                })
            }
            ChatMode::Qa => {
                // Follow-ups only make sense inside an existing conversation.
                let prior = match &request.conversation_id {
                    Some(id) => {
                        history::assemble_history(id, self.config.history_window, &self.db).await?
                    }
                    None => Vec::new(),
                };

                let completion = synthesizer::qa_request(&request.message, &context_block, prior);
                let response = self
                    .with_timeout("answer generation", self.services.complete(completion))
                    .await?;

                self.persist_turn(user_id, &conversation_id, request, &response)
                    .await?;
                info!(
                    conversation_id,
                    passages = context.passages.len(),
                    "answer generated"
                );

                Ok(PipelineResult {
                    response,
                    mode: request.mode,
                    conversation_id,
                    timestamp: Utc::now(),
                    discussion: None,
                })
            }
        }
    }

    async fn persist_turn(
        &self,
        user_id: &str,
        conversation_id: &str,
        request: &ChatRequest,
        response: &str,
    ) -> Result<(), AppError> {
        self.db
            .store_item(ChatTurn::new(
                user_id.to_string(),
                conversation_id.to_string(),
                request.message.clone(),
                response.to_string(),
                request.mode,
            ))
            .await?;
        Ok(())
    }

    async fn with_timeout<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        timeout(self.config.call_timeout, fut)
            .await
            .map_err(|_| AppError::Timeout(operation.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::storage::types::text_chunk::ChunkMatch;
    use services::CompletionRequest;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    #[derive(Clone, Copy)]
    enum Verdict {
        InDomain,
        OffTopic,
        Failing,
    }

    enum Completion {
        Text(String),
        Fail,
        Hang,
    }

    struct StubServices {
        verdict: Verdict,
        matches: Vec<ChunkMatch>,
        completion: Completion,
        embed_calls: AtomicUsize,
        completions_seen: Mutex<Vec<CompletionRequest>>,
    }

    impl StubServices {
        fn new(verdict: Verdict, matches: Vec<ChunkMatch>, completion: Completion) -> Self {
            StubServices {
                verdict,
                matches,
                completion,
                embed_calls: AtomicUsize::new(0),
                completions_seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatServices for StubServices {
        async fn classify_domain(&self, _query: &str) -> Result<bool, AppError> {
            match self.verdict {
                Verdict::InDomain => Ok(true),
                Verdict::OffTopic => Ok(false),
                Verdict::Failing => Err(AppError::Generation("classifier down".into())),
            }
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, AppError> {
            self.embed_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0, 0.0])
        }

        async fn search_chunks(
            &self,
            _embedding: Vec<f32>,
            top_k: usize,
        ) -> Result<Vec<ChunkMatch>, AppError> {
            Ok(self.matches.iter().take(top_k).cloned().collect())
        }

        async fn complete(&self, request: CompletionRequest) -> Result<String, AppError> {
            self.completions_seen
                .lock()
                .expect("lock poisoned")
                .push(request);
            match &self.completion {
                Completion::Text(text) => Ok(text.clone()),
                Completion::Fail => Err(AppError::Generation("model down".into())),
                Completion::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(String::new())
                }
            }
        }
    }

    fn hit(text: &str, score: f32) -> ChunkMatch {
        ChunkMatch {
            id: "doc_chunk_0".to_string(),
            source_id: "doc".to_string(),
            chunk: text.to_string(),
            score,
        }
    }

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            top_k: 5,
            similarity_threshold: 0.7,
            history_window: 10,
            call_timeout: Duration::from_secs(5),
        }
    }

    fn qa_message(message: &str) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            mode: ChatMode::Qa,
            language: "en".to_string(),
            conversation_id: None,
        }
    }

    async fn memory_db() -> Arc<SurrealDbClient> {
        let database = &Uuid::new_v4().to_string();
        Arc::new(
            SurrealDbClient::memory("test_ns", database)
                .await
                .expect("Failed to start in-memory surrealdb"),
        )
    }

    async fn pipeline_with(
        db: Arc<SurrealDbClient>,
        services: Arc<StubServices>,
    ) -> ChatPipeline {
        ChatPipeline::new(db, services, test_config())
    }

    #[tokio::test]
    async fn test_off_topic_query_gets_refusal_without_retrieval() {
        let db = memory_db().await;
        let services = Arc::new(StubServices::new(
            Verdict::OffTopic,
            vec![hit("never used", 0.99)],
            Completion::Text("never used".into()),
        ));
        let pipeline = pipeline_with(db.clone(), services.clone()).await;

        let result = pipeline
            .handle("student_1", qa_message("Best pizza in town?"))
            .await
            .expect("handle");

        assert_eq!(result.response, OFF_TOPIC_RESPONSE);
        assert!(result.discussion.is_none());
        assert!(!result.conversation_id.is_empty());
        assert_eq!(services.embed_calls.load(Ordering::SeqCst), 0);

        let turns = db
            .get_all_stored_items::<ChatTurn>()
            .await
            .expect("fetch turns");
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].bot_response, OFF_TOPIC_RESPONSE);

        let analytics = QueryAnalytics::get_recent(10, &db).await.expect("analytics");
        assert_eq!(analytics.len(), 1);
        assert_eq!(analytics[0].query, "Best pizza in town?");
    }

    #[tokio::test]
    async fn test_qa_uses_surviving_context_and_persists_turn() {
        let db = memory_db().await;
        let services = Arc::new(StubServices::new(
            Verdict::InDomain,
            vec![hit("GST is an indirect tax.", 0.9), hit("noise", 0.3)],
            Completion::Text("GST stands for Goods and Services Tax.".into()),
        ));
        let pipeline = pipeline_with(db.clone(), services.clone()).await;

        let result = pipeline
            .handle("student_1", qa_message("What is GST?"))
            .await
            .expect("handle");

        assert_eq!(result.response, "GST stands for Goods and Services Tax.");
        assert_eq!(result.mode, ChatMode::Qa);

        let seen = services.completions_seen.lock().expect("lock poisoned");
        assert_eq!(seen.len(), 1);
        assert!(seen[0].user_content.contains("GST is an indirect tax."));
        assert!(!seen[0].user_content.contains("noise"));
        assert!(seen[0].history.is_empty());
        drop(seen);

        let turns = db
            .get_all_stored_items::<ChatTurn>()
            .await
            .expect("fetch turns");
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].message, "What is GST?");
        assert_eq!(turns[0].bot_response, "GST stands for Goods and Services Tax.");
    }

    #[tokio::test]
    async fn test_qa_forwards_conversation_history() {
        let db = memory_db().await;
        for i in 0..3 {
            let mut turn = ChatTurn::new(
                "student_1".to_string(),
                "conv_9".to_string(),
                format!("earlier question {i}"),
                format!("earlier answer {i}"),
                ChatMode::Qa,
            );
            turn.created_at += chrono::Duration::seconds(i);
            turn.updated_at = turn.created_at;
            db.store_item(turn).await.expect("store");
        }

        let services = Arc::new(StubServices::new(
            Verdict::InDomain,
            Vec::new(),
            Completion::Text("follow-up answer".into()),
        ));
        let pipeline = pipeline_with(db.clone(), services.clone()).await;

        let mut request = qa_message("And what about input credit?");
        request.conversation_id = Some("conv_9".to_string());

        let result = pipeline.handle("student_1", request).await.expect("handle");
        assert_eq!(result.conversation_id, "conv_9");

        let seen = services.completions_seen.lock().expect("lock poisoned");
        assert_eq!(seen[0].history.len(), 6);
        assert_eq!(seen[0].history[0].content, "earlier question 0");
        assert_eq!(seen[0].history[5].content, "earlier answer 2");
    }

    #[tokio::test]
    async fn test_discussion_mode_returns_parts_and_transcript() {
        let db = memory_db().await;
        let raw = r#"{"discussion": [
            {"speaker": "Expert CA", "text": "Theory first."},
            {"speaker": "Auditor", "text": "Practice matters."}
        ]}"#;
        let services = Arc::new(StubServices::new(
            Verdict::InDomain,
            Vec::new(),
            Completion::Text(raw.to_string()),
        ));
        let pipeline = pipeline_with(db.clone(), services.clone()).await;

        let mut request = qa_message("Debate audit rotation");
        request.mode = ChatMode::Discussion;

        let result = pipeline.handle("student_1", request).await.expect("handle");

        assert_eq!(
            result.response,
            "Expert CA: Theory first.\n\nAuditor: Practice matters."
        );
        let parts = result.discussion.expect("discussion parts");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].speaker, "Expert CA");

        let seen = services.completions_seen.lock().expect("lock poisoned");
        assert!(seen[0].json_response);
        assert!(seen[0].history.is_empty());
        drop(seen);

        let turns = db
            .get_all_stored_items::<ChatTurn>()
            .await
            .expect("fetch turns");
        assert_eq!(turns[0].bot_response, result.response);
        assert_eq!(turns[0].mode, ChatMode::Discussion);
    }

    #[tokio::test]
    async fn test_malformed_discussion_degrades_to_empty_response() {
        let db = memory_db().await;
        let services = Arc::new(StubServices::new(
            Verdict::InDomain,
            Vec::new(),
            Completion::Text("not json".into()),
        ));
        let pipeline = pipeline_with(db.clone(), services).await;

        let mut request = qa_message("Debate audit rotation");
        request.mode = ChatMode::Discussion;

        let result = pipeline.handle("student_1", request).await.expect("handle");

        assert_eq!(result.response, "");
        assert_eq!(result.discussion, Some(Vec::new()));

        let turns = db
            .get_all_stored_items::<ChatTurn>()
            .await
            .expect("fetch turns");
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].bot_response, "");

        let analytics = QueryAnalytics::get_recent(10, &db).await.expect("analytics");
        assert_eq!(analytics.len(), 1);
    }

    #[tokio::test]
    async fn test_generation_failure_records_analytics_only() {
        let db = memory_db().await;
        let services = Arc::new(StubServices::new(
            Verdict::InDomain,
            Vec::new(),
            Completion::Fail,
        ));
        let pipeline = pipeline_with(db.clone(), services).await;

        let err = pipeline
            .handle("student_1", qa_message("What is GST?"))
            .await
            .expect_err("should fail");
        assert!(matches!(err, AppError::Generation(_)));

        let turns = db
            .get_all_stored_items::<ChatTurn>()
            .await
            .expect("fetch turns");
        assert!(turns.is_empty());

        let analytics = QueryAnalytics::get_recent(10, &db).await.expect("analytics");
        assert_eq!(analytics.len(), 1);
    }

    #[tokio::test]
    async fn test_classifier_failure_fails_open_into_qa() {
        let db = memory_db().await;
        let services = Arc::new(StubServices::new(
            Verdict::Failing,
            Vec::new(),
            Completion::Text("answer anyway".into()),
        ));
        let pipeline = pipeline_with(db.clone(), services).await;

        let result = pipeline
            .handle("student_1", qa_message("What is GST?"))
            .await
            .expect("handle");

        assert_eq!(result.response, "answer anyway");
    }

    #[tokio::test]
    async fn test_slow_generation_times_out() {
        let db = memory_db().await;
        let services = Arc::new(StubServices::new(
            Verdict::InDomain,
            Vec::new(),
            Completion::Hang,
        ));
        let mut config = test_config();
        config.call_timeout = Duration::from_millis(50);
        let pipeline = ChatPipeline::new(db.clone(), services, config);

        let err = pipeline
            .handle("student_1", qa_message("What is GST?"))
            .await
            .expect_err("should time out");
        assert!(matches!(err, AppError::Timeout(_)));

        let analytics = QueryAnalytics::get_recent(10, &db).await.expect("analytics");
        assert_eq!(analytics.len(), 1);
    }

    #[tokio::test]
    async fn test_supplied_conversation_id_is_kept() {
        let db = memory_db().await;
        let services = Arc::new(StubServices::new(
            Verdict::OffTopic,
            Vec::new(),
            Completion::Text(String::new()),
        ));
        let pipeline = pipeline_with(db, services).await;

        let mut request = qa_message("off topic");
        request.conversation_id = Some("conv_keep".to_string());

        let result = pipeline.handle("student_1", request).await.expect("handle");
        assert_eq!(result.conversation_id, "conv_keep");
    }
}
