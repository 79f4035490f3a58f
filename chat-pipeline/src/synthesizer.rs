//! Prompt construction and response shaping for the two generation modes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::services::{CompletionRequest, Exchange};

pub const QA_SYSTEM_PROMPT: &str = "You are an expert AI tutor for Chartered Accountancy (CA) students in India.
Your role is to help students understand complex CA concepts, provide detailed explanations, and answer questions
accurately based on the Indian CA curriculum. Be professional, encouraging, and thorough in your responses.
Support both English and Hindi languages when requested.";

pub const DISCUSSION_SYSTEM_PROMPT: &str = "You are orchestrating a debate between two expert CA professionals:
- Expert CA: A practicing Chartered Accountant with deep theoretical knowledge
- Auditor: An experienced auditor with practical implementation focus

Generate a balanced, insightful discussion exploring different perspectives on the topic.
Each speaker should make 3-4 points. Format the response as a JSON array with objects containing 'speaker' and 'text' fields.";

/// The generator never sees more than this many prior messages, whatever the
/// configured history window produced.
const MAX_HISTORY_MESSAGES: usize = 10;

/// One speaker contribution in a generated debate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscussionPart {
    pub speaker: String,
    pub text: String,
}

/// Builds the tutoring completion for question-answering mode. Retrieved
/// context is prepended to the question; an empty context sends the question
/// bare so the model is not prompted with an empty knowledge-base block.
pub fn qa_request(message: &str, context: &str, mut history: Vec<Exchange>) -> CompletionRequest {
    if history.len() > MAX_HISTORY_MESSAGES {
        history.drain(..history.len() - MAX_HISTORY_MESSAGES);
    }

    let user_content = if context.is_empty() {
        message.to_string()
    } else {
        format!("Context from knowledge base:\n{context}\n\nUser Question: {message}")
    };

    CompletionRequest {
        system_prompt: QA_SYSTEM_PROMPT.to_string(),
        history,
        user_content,
        temperature: 0.7,
        max_tokens: 1500,
        json_response: false,
    }
}

/// Builds the debate completion. Discussions are single-shot: prior
/// conversation turns are not forwarded.
pub fn discussion_request(topic: &str, context: &str) -> CompletionRequest {
    let mut user_content = format!("Topic: {topic}\n");
    if !context.is_empty() {
        user_content.push_str(&format!("\nContext from knowledge base:\n{context}\n"));
    }
    user_content.push_str("\nGenerate a constructive debate between Expert CA and Auditor on this topic.");

    CompletionRequest {
        system_prompt: DISCUSSION_SYSTEM_PROMPT.to_string(),
        history: Vec::new(),
        user_content,
        temperature: 0.8,
        max_tokens: 2000,
        json_response: true,
    }
}

/// Parses the model's JSON into discussion parts. The object is expected to
/// carry a `discussion` array. Output that is not valid JSON, lacks the key,
/// or holds malformed entries collapses to an empty debate; a model hiccup
/// must never fail the request.
pub fn parse_discussion(raw: &str) -> Vec<DiscussionPart> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "discussion response was not valid JSON");
            return Vec::new();
        }
    };

    match value.get("discussion") {
        Some(parts) => serde_json::from_value(parts.clone()).unwrap_or_else(|err| {
            warn!(error = %err, "discussion entries were malformed");
            Vec::new()
        }),
        None => Vec::new(),
    }
}

/// Flattens a debate into the transcript stored and shown as the response.
pub fn render_discussion(parts: &[DiscussionPart]) -> String {
    parts
        .iter()
        .map(|part| format!("{}: {}", part.speaker, part.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
