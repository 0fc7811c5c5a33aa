//! Per-session conversation memory.
//!
//! [`ConversationMemory`] is the capability every variant offers: render the history, record a
//! turn, forget everything. Two variants exist:
//!
//! - [`SummaryBufferMemory`] keeps recent turns verbatim and folds older ones into a running
//!   summary written by a language model once the buffer exceeds its token budget.
//! - [`TimestampedLogMemory`] keeps every message with its wall-clock time.
//!
//! [`SessionStore`] owns one memory per session id and decides which variant new sessions get.

mod store;
mod summary;
mod timestamped;

pub use store::{
    MemoryFactory, Session, SessionSnapshot, SessionState, SessionStore, memory_factory,
    spawn_idle_eviction,
};
pub use summary::{SummaryBufferMemory, TokenCounter, cl100k_counter};
pub use timestamped::TimestampedLogMemory;

use crate::llm::LlmError;
use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

/// Errors raised while reading or updating conversation memory.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The language model failed to refresh the running summary.
    #[error("Failed to summarize conversation: {0}")]
    Summarization(#[from] LlmError),
    /// Tokenizer resources could not be loaded.
    #[error("Failed to initialize tokenizer: {0}")]
    Tokenizer(#[source] anyhow::Error),
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The person chatting.
    User,
    /// The chatbot.
    Assistant,
}

impl Role {
    /// Speaker prefix used when rendering history for a prompt.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::User => "Human",
            Self::Assistant => "AI",
        }
    }
}

/// One stored message.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    /// Author.
    pub role: Role,
    /// Message text, stored verbatim.
    pub content: String,
    /// When the message was recorded.
    pub timestamp: OffsetDateTime,
}

impl ChatMessage {
    fn pair(user_text: &str, bot_text: &str) -> [Self; 2] {
        let timestamp = OffsetDateTime::now_utc();
        [
            Self {
                role: Role::User,
                content: user_text.to_string(),
                timestamp,
            },
            Self {
                role: Role::Assistant,
                content: bot_text.to_string(),
                timestamp,
            },
        ]
    }
}

/// Capability shared by all memory variants.
#[async_trait]
pub trait ConversationMemory: Send + Sync {
    /// History text inserted into the next prompt.
    fn load(&self) -> String;

    /// Record one user/bot exchange.
    async fn save(&mut self, user_text: &str, bot_text: &str) -> Result<(), MemoryError>;

    /// Forget everything recorded so far.
    fn clear(&mut self);

    /// Messages currently held verbatim, oldest first.
    fn messages(&self) -> &[ChatMessage];
}

/// Render messages as `Human: …` / `AI: …` lines.
pub(crate) fn render_lines(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|message| format!("{}: {}", message.role.prefix(), message.content))
        .collect::<Vec<_>>()
        .join("\n")
}
