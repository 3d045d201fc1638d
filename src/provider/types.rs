//! Wire types shared by the gateway handlers and the provider client
//!
//! Shapes follow the OpenAI Chat Completions API. Provider responses are
//! parsed leniently (missing optional fields default) and checked where the
//! gateway actually reads them.

use crate::error::ProviderError;
use serde::{Deserialize, Serialize};

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One turn of a conversation
///
/// Conversations are `Vec<ChatMessage>`; their order is the turn order and is
/// forwarded to the provider unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    role: MessageRole,
    content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn role(&self) -> MessageRole {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Content length in Unicode characters
    pub fn content_length(&self) -> usize {
        self.content.chars().count()
    }
}

/// Non-streaming completion as returned by the provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    usage: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletion {
    /// Build a single-choice completion
    pub fn new(content: impl Into<String>, usage: Option<serde_json::Value>) -> Self {
        Self {
            choices: vec![CompletionChoice {
                message: CompletionMessage {
                    content: Some(content.into()),
                },
            }],
            usage,
        }
    }

    /// Text of the first choice
    ///
    /// # Errors
    ///
    /// `MalformedResponse` when there are no choices or the first choice has
    /// no text content.
    pub fn first_content(&self) -> Result<&str, ProviderError> {
        let choice = self.choices.first().ok_or_else(|| {
            ProviderError::MalformedResponse("completion contains no choices".to_string())
        })?;
        choice.message.content.as_deref().ok_or_else(|| {
            ProviderError::MalformedResponse(
                "first choice has no message content".to_string(),
            )
        })
    }

    /// Token-count metadata, `null` when the provider sent none
    pub fn usage(&self) -> serde_json::Value {
        self.usage.clone().unwrap_or(serde_json::Value::Null)
    }
}

/// One incremental unit of a streamed completion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    /// Error object some providers send in-band instead of failing the stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

impl ChatChunk {
    /// Chunk carrying one text fragment
    pub fn text(fragment: impl Into<String>) -> Self {
        Self {
            choices: vec![ChunkChoice {
                delta: Delta {
                    content: Some(fragment.into()),
                },
            }],
            error: None,
        }
    }

    /// Incremental text of this chunk; empty when the chunk carries none
    pub fn fragment(&self) -> &str {
        self.choices
            .first()
            .and_then(|c| c.delta.content.as_deref())
            .unwrap_or("")
    }

    /// In-band provider error message, if this chunk reports one
    pub fn error_message(&self) -> Option<String> {
        let error = self.error.as_ref()?;
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        Some(message)
    }
}
