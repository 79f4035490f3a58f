//! Conversation history assembly for the generator prompt.

use common::{error::AppError, storage::db::SurrealDbClient, storage::types::chat_turn::ChatTurn};

use crate::services::{Exchange, ExchangeRole};

/// Loads the last `window` turns of a conversation and flattens them into
/// user/assistant message pairs, oldest first. A conversation id that matches
/// nothing yields an empty history rather than an error.
pub async fn assemble_history(
    conversation_id: &str,
    window: usize,
    db: &SurrealDbClient,
) -> Result<Vec<Exchange>, AppError> {
    let mut turns = ChatTurn::get_recent_turns(conversation_id, window, db).await?;
    turns.reverse();

    let mut exchanges = Vec::with_capacity(turns.len() * 2);
    for turn in turns {
        exchanges.push(Exchange {
            role: ExchangeRole::User,
            content: turn.message,
        });
        exchanges.push(Exchange {
            role: ExchangeRole::Assistant,
            content: turn.bot_response,
        });
    }

    Ok(exchanges)
}
