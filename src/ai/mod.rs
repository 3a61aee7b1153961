pub mod cancel;
pub mod gemini;
pub mod llm;
pub mod research_log;
pub mod sse;
pub mod streaming;
pub mod transport;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use cancel::CancelToken;
pub use llm::{start_stream, start_stream_observed, StreamOutcome, StreamState};
pub use transport::{HttpTransport, Transport};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// One entry of the conversation. While a stream is in flight the last
/// message grows in place through [`ChatMessage::apply_delta`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            reasoning: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            reasoning: None,
        }
    }

    /// Empty assistant turn that the next stream fills in.
    pub fn assistant_placeholder() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            reasoning: Some(String::new()),
        }
    }

    pub fn apply_delta(&mut self, delta: &StreamDelta) {
        if let Some(content) = &delta.content {
            self.content.push_str(content);
        }
        if let Some(reasoning) = &delta.reasoning {
            self.reasoning
                .get_or_insert_with(String::new)
                .push_str(reasoning);
        }
    }
}

/// Fragment of a streamed answer: visible text, reasoning text, or both.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl StreamDelta {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            reasoning: None,
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            content: None,
            reasoning: Some(text.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.reasoning.is_none()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AiError {
    /// Missing key or endpoint; no request was sent.
    #[error("{0}")]
    Configuration(String),
    #[error("API Error {status}: {message}")]
    Http { status: u16, message: String },
    #[error("stopped by user")]
    Cancelled,
    #[error("API Failed: {0}")]
    Transport(String),
}

impl AiError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AiError::Cancelled)
    }

    /// Everything except a user-initiated stop deserves an error banner.
    pub fn is_user_visible(&self) -> bool {
        !self.is_cancelled()
    }
}
