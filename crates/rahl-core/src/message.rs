//! Message types — what flows between callers, sessions and providers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a conversation history or an outbound prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: Role::System,
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
        }
    }
}

/// A chat message arriving from a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatInput {
    #[serde(alias = "session_id")]
    pub session_id: String,
    pub message: String,
}

impl ChatInput {
    pub fn new(session_id: &str, message: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            message: message.to_string(),
        }
    }
}

/// Structured reply handed back to the caller.
///
/// In chat mode only `message` is populated; the code-bearing fields stay
/// at their empty values.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub message: String,
    pub code: String,
    pub files: BTreeMap<String, String>,
    pub should_update: bool,
    pub is_coding_mode: bool,
}

impl ChatReply {
    /// Plain conversational reply with every other field empty.
    pub fn text(message: &str, is_coding_mode: bool) -> Self {
        Self {
            message: message.to_string(),
            is_coding_mode,
            ..Default::default()
        }
    }
}

/// Response from an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: Option<String>,
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: String,
}

/// Token usage statistics.
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
