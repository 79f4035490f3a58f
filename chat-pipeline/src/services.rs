//! Model-backed capabilities the pipeline depends on, behind one trait so
//! tests can substitute deterministic stand-ins.

use std::sync::Arc;

use async_openai::{
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::text_chunk::{ChunkMatch, TextChunk},
    },
    utils::{config::AppConfig, embedding::EmbeddingProvider},
};

const CLASSIFIER_SYSTEM_PROMPT: &str = "You are a classifier that determines if a query is related to Chartered Accountancy (CA) topics.
CA topics include: accounting, auditing, taxation, corporate law, financial reporting, IFRS, Indian Accounting Standards,
GST, income tax, company law, ethics, finance, cost accounting, and related subjects.
Respond with only 'true' or 'false'.";

/// One prior message in a conversation, already ordered oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub role: ExchangeRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeRole {
    User,
    Assistant,
}

/// A fully-specified chat completion call. The pipeline decides prompts,
/// sampling, and output shape; the service only executes.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub history: Vec<Exchange>,
    pub user_content: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub json_response: bool,
}

#[async_trait]
pub trait ChatServices: Send + Sync {
    /// Whether the query falls inside the tutoring domain.
    async fn classify_domain(&self, query: &str) -> Result<bool, AppError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError>;

    /// Nearest chunks for a query embedding, best first.
    async fn search_chunks(
        &self,
        embedding: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<ChunkMatch>, AppError>;

    async fn complete(&self, request: CompletionRequest) -> Result<String, AppError>;
}

/// Production implementation backed by the OpenAI API and the SurrealDB
/// vector index.
pub struct OpenAiChatServices {
    client: Arc<Client<async_openai::config::OpenAIConfig>>,
    db: Arc<SurrealDbClient>,
    embeddings: EmbeddingProvider,
    chat_model: String,
    gate_model: String,
}

impl OpenAiChatServices {
    pub fn new(
        client: Arc<Client<async_openai::config::OpenAIConfig>>,
        db: Arc<SurrealDbClient>,
        embeddings: EmbeddingProvider,
        chat_model: String,
        gate_model: String,
    ) -> Self {
        OpenAiChatServices {
            client,
            db,
            embeddings,
            chat_model,
            gate_model,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        client: Arc<Client<async_openai::config::OpenAIConfig>>,
        db: Arc<SurrealDbClient>,
        embeddings: EmbeddingProvider,
    ) -> Self {
        Self::new(
            client,
            db,
            embeddings,
            config.chat_model.clone(),
            config.gate_model.clone(),
        )
    }

    fn first_choice_content(
        response: async_openai::types::CreateChatCompletionResponse,
    ) -> Result<String, AppError> {
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::LLMParsing("No content found in LLM response".into()))
    }
}

#[async_trait]
impl ChatServices for OpenAiChatServices {
    async fn classify_domain(&self, query: &str) -> Result<bool, AppError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.gate_model)
            .messages([
                ChatCompletionRequestSystemMessage::from(CLASSIFIER_SYSTEM_PROMPT).into(),
                ChatCompletionRequestUserMessage::from(format!(
                    "Is this query related to CA topics? Query: {query}"
                ))
                .into(),
            ])
            .temperature(0.3)
            .max_completion_tokens(10u32)
            .build()?;

        let response = self.client.chat().create(request).await?;
        let verdict = Self::first_choice_content(response)?;

        Ok(verdict.trim().eq_ignore_ascii_case("true"))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        self.embeddings.embed(text).await
    }

    async fn search_chunks(
        &self,
        embedding: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<ChunkMatch>, AppError> {
        TextChunk::find_similar(embedding, top_k, &self.db).await
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, AppError> {
        let mut messages: Vec<ChatCompletionRequestMessage> =
            Vec::with_capacity(request.history.len() + 2);
        messages.push(ChatCompletionRequestSystemMessage::from(request.system_prompt).into());

        for exchange in request.history {
            let message = match exchange.role {
                ExchangeRole::User => {
                    ChatCompletionRequestUserMessage::from(exchange.content).into()
                }
                ExchangeRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(exchange.content)
                    .build()?
                    .into(),
            };
            messages.push(message);
        }

        messages.push(ChatCompletionRequestUserMessage::from(request.user_content).into());

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.chat_model)
            .messages(messages)
            .temperature(request.temperature)
            .max_completion_tokens(request.max_tokens);
        if request.json_response {
            builder.response_format(ResponseFormat::JsonObject);
        }

        let response = self.client.chat().create(builder.build()?).await?;
        Self::first_choice_content(response)
    }
}
