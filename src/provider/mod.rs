//! Provider collaborator contract and the OpenAI-compatible client
//!
//! Handlers only see the [`Provider`] trait. The streaming flag selects the
//! variant of [`ChatReply`] up front, so callers never inspect a returned
//! value to find out which shape they got.

use crate::error::ProviderError;
use async_trait::async_trait;
use futures::stream::BoxStream;

pub mod openai;
pub mod retry;
pub mod sse;
pub mod types;

pub use openai::OpenAiProvider;
pub use retry::RetryPolicy;
pub use types::{ChatChunk, ChatCompletion, ChatMessage, MessageRole};

/// Ordered, finite sequence of incremental chunks
///
/// Dropping the stream abandons the upstream response.
pub type ChunkStream = BoxStream<'static, Result<ChatChunk, ProviderError>>;

/// Result of a chat query, tagged by the streaming flag of the request
pub enum ChatReply {
    /// `stream: false`
    Complete(ChatCompletion),
    /// `stream: true`
    Stream(ChunkStream),
}

impl std::fmt::Debug for ChatReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatReply::Complete(completion) => {
                f.debug_tuple("Complete").field(completion).finish()
            }
            ChatReply::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// The LLM provider as seen by the gateway
#[async_trait]
pub trait Provider: Send + Sync {
    /// Single completion for the full conversation
    async fn complete(&self, messages: &[ChatMessage]) -> Result<ChatCompletion, ProviderError>;

    /// Incremental completion for the full conversation
    ///
    /// Resolves once the provider has accepted the request; the returned
    /// stream yields chunks in arrival order.
    async fn stream(&self, messages: &[ChatMessage]) -> Result<ChunkStream, ProviderError>;

    /// Structured analysis of a raw text blob
    async fn analyze(&self, text: &str) -> Result<serde_json::Value, ProviderError>;

    /// Query with the request's streaming flag
    async fn query(
        &self,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<ChatReply, ProviderError> {
        if stream {
            self.stream(messages).await.map(ChatReply::Stream)
        } else {
            self.complete(messages).await.map(ChatReply::Complete)
        }
    }
}
