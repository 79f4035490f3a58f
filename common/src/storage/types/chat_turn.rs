#![allow(clippy::module_name_repetitions)]
use std::fmt;

use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Dispatch key selecting the response-generation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    Qa,
    Discussion,
}

impl Default for ChatMode {
    fn default() -> Self {
        Self::Qa
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatMode::Qa => write!(f, "qa"),
            ChatMode::Discussion => write!(f, "discussion"),
        }
    }
}

stored_object!(ChatTurn, "chat_turn", {
    user_id: String,
    conversation_id: String,
    message: String,
    bot_response: String,
    mode: ChatMode
});

impl ChatTurn {
    pub fn new(
        user_id: String,
        conversation_id: String,
        message: String,
        bot_response: String,
        mode: ChatMode,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            user_id,
            conversation_id,
            message,
            bot_response,
            mode,
        }
    }

    /// Most recent turns of one conversation, newest first. Callers that
    /// present history to the generator are responsible for re-ordering.
    pub async fn get_recent_turns(
        conversation_id: &str,
        limit: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let turns: Vec<Self> = db
            .client
            .query(format!(
                "SELECT * FROM type::table($table) WHERE conversation_id = $conversation_id \
                 ORDER BY created_at DESC LIMIT {limit}"
            ))
            .bind(("table", Self::table_name()))
            .bind(("conversation_id", conversation_id.to_string()))
            .await?
            .take(0)?;

        Ok(turns)
    }

    /// Full conversation transcript, oldest first.
    pub async fn get_conversation(
        conversation_id: &str,
        limit: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let turns: Vec<Self> = db
            .client
            .query(format!(
                "SELECT * FROM type::table($table) WHERE conversation_id = $conversation_id \
                 ORDER BY created_at ASC LIMIT {limit}"
            ))
            .bind(("table", Self::table_name()))
            .bind(("conversation_id", conversation_id.to_string()))
            .await?
            .take(0)?;

        Ok(turns)
    }

    /// A user's chat history across conversations, newest first.
    pub async fn get_user_history(
        user_id: &str,
        limit: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let turns: Vec<Self> = db
            .client
            .query(format!(
                "SELECT * FROM type::table($table) WHERE user_id = $user_id \
                 ORDER BY created_at DESC LIMIT {limit}"
            ))
            .bind(("table", Self::table_name()))
            .bind(("user_id", user_id.to_string()))
            .await?
            .take(0)?;

        Ok(turns)
    }
}
