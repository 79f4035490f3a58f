use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chat_pipeline::ChatRequest;
use common::storage::types::chat_turn::{ChatMode, ChatTurn};

use crate::{api_state::ApiState, error::ApiError};

/// Stand-in for real authentication: callers identify themselves with a
/// header, and everything else is treated as one anonymous user.
const USER_ID_HEADER: &str = "x-user-id";
const ANONYMOUS_USER: &str = "anonymous";

const HISTORY_DEFAULT_LIMIT: usize = 50;
const CONVERSATION_LIMIT: usize = 100;

fn user_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(ANONYMOUS_USER)
        .to_string()
}

/// One persisted turn as the API presents it.
#[derive(Debug, Serialize)]
pub struct ChatHistoryEntry {
    pub id: String,
    pub conversation_id: String,
    pub message: String,
    pub bot_response: String,
    pub mode: ChatMode,
    pub created_at: DateTime<Utc>,
}

impl From<ChatTurn> for ChatHistoryEntry {
    fn from(turn: ChatTurn) -> Self {
        ChatHistoryEntry {
            id: turn.id,
            conversation_id: turn.conversation_id,
            message: turn.message,
            bot_response: turn.bot_response,
            mode: turn.mode,
            created_at: turn.created_at,
        }
    }
}

pub async fn chat(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.message.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "message must not be empty".to_string(),
        ));
    }

    let user_id = user_id_from_headers(&headers);
    let result = state.chat.handle(&user_id, request).await?;

    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    HISTORY_DEFAULT_LIMIT
}

pub async fn chat_history(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ChatHistoryEntry>>, ApiError> {
    let user_id = user_id_from_headers(&headers);
    let turns = ChatTurn::get_user_history(&user_id, query.limit, &state.db).await?;

    Ok(Json(turns.into_iter().map(ChatHistoryEntry::from).collect()))
}

pub async fn conversation(
    State(state): State<ApiState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<Vec<ChatHistoryEntry>>, ApiError> {
    let turns = ChatTurn::get_conversation(&conversation_id, CONVERSATION_LIMIT, &state.db).await?;

    Ok(Json(turns.into_iter().map(ChatHistoryEntry::from).collect()))
}
