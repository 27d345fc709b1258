//! Conversation history as seen by the core.
//!
//! History storage belongs to the surrounding UI layer; the core only ever
//! reads a trailing window of turns at call time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The last `n` turns in order, as chat messages.
pub fn recent_turns(history: &[ConversationTurn], n: usize) -> Vec<ChatMessage> {
    let start = history.len().saturating_sub(n);
    history[start..]
        .iter()
        .map(|turn| ChatMessage {
            role: turn.role.as_str().to_string(),
            content: turn.text.clone(),
        })
        .collect()
}

/// User identity supplied per request; never cached beyond one
/// orchestration call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
            attributes: serde_json::Map::new(),
        }
    }
}
