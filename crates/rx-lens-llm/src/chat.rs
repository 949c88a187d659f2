//! Free-form assistant chat over a [`TextGenerator`].

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::client::{GenerationError, TextGenerator};

/// Default Gemini model for chat.
pub const DEFAULT_GEMINI_CHAT_MODEL: &str = "gemini-1.5-flash";

/// Reply text when the service answers with nothing.
pub const NO_AI_RESPONSE: &str = "No response from AI.";

/// Who spoke a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Model => "model",
        }
    }
}

impl std::str::FromStr for ChatRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ChatRole::User),
            "model" => Ok(ChatRole::Model),
            other => Err(format!("expected user or model, got {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPart {
    pub text: String,
}

/// One conversation turn, shaped like a Gemini `contents` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub parts: Vec<ChatPart>,
}

impl ChatTurn {
    pub fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![ChatPart { text: text.into() }],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(ChatRole::User, text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new(ChatRole::Model, text)
    }

    /// All parts joined.
    pub fn text(&self) -> String {
        self.parts.iter().map(|p| p.text.as_str()).collect()
    }
}

/// An answer plus the history extended by the question and the answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub text: String,
    pub history: Vec<ChatTurn>,
}

/// Chat errors.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Message is required")]
    EmptyMessage,

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Stateless chat: the caller owns the history and passes it back each turn.
pub struct ChatSession {
    generator: Box<dyn TextGenerator>,
}

impl ChatSession {
    pub fn new(generator: Box<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Answer `message` in the context of `history`.
    ///
    /// A blank answer becomes [`NO_AI_RESPONSE`]; any other service failure
    /// is returned.
    pub fn send(&self, message: &str, history: Vec<ChatTurn>) -> Result<ChatReply, ChatError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let mut turns = history;
        turns.push(ChatTurn::user(message));
        debug!(turns = turns.len(), "Sending chat message");

        let text = match self.generator.generate_chat(&turns) {
            Ok(reply) => reply.trim().to_string(),
            Err(GenerationError::Empty) => {
                warn!(stage = "chat", "Service returned no text");
                NO_AI_RESPONSE.to_string()
            }
            Err(e) => {
                warn!(stage = "chat", error = %e, "Chat request failed");
                return Err(e.into());
            }
        };

        turns.push(ChatTurn::model(text.clone()));
        Ok(ChatReply {
            text,
            history: turns,
        })
    }
}
