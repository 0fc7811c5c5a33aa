use super::{ChatMessage, ConversationMemory, MemoryError};
use async_trait::async_trait;

const DEFAULT_RECENT_LIMIT: usize = 5;

/// Verbatim message log with wall-clock timestamps.
///
/// History is the plain concatenation of message contents, one per line, oldest first.
#[derive(Debug, Default)]
pub struct TimestampedLogMemory {
    messages: Vec<ChatMessage>,
}

impl TimestampedLogMemory {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append messages as-is, keeping their timestamps.
    pub fn add_messages(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        self.messages.extend(messages);
    }

    /// The last `limit` messages, oldest first.
    pub fn recent_messages(&self, limit: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(limit);
        &self.messages[start..]
    }

    /// The last five messages.
    pub fn recent(&self) -> &[ChatMessage] {
        self.recent_messages(DEFAULT_RECENT_LIMIT)
    }
}

#[async_trait]
impl ConversationMemory for TimestampedLogMemory {
    fn load(&self) -> String {
        self.messages
            .iter()
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn save(&mut self, user_text: &str, bot_text: &str) -> Result<(), MemoryError> {
        self.add_messages(ChatMessage::pair(user_text, bot_text));
        Ok(())
    }

    fn clear(&mut self) {
        self.messages.clear();
    }

    fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }
}
