use super::{ChatMessage, ConversationMemory, MemoryError, render_lines};
use crate::llm::LanguageModel;
use async_trait::async_trait;
use std::sync::Arc;
use tiktoken_rs::cl100k_base;

/// Counts tokens in a string.
pub type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Token counter backed by the `cl100k_base` encoding.
pub fn cl100k_counter() -> Result<TokenCounter, MemoryError> {
    let encoding = Arc::new(cl100k_base().map_err(MemoryError::Tokenizer)?);
    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

/// Recent turns kept verbatim plus a model-written summary of everything older.
///
/// After each save the buffer is measured with the token counter. While it exceeds
/// `max_token_limit`, the oldest messages move out of the buffer and are folded into the
/// summary by a single call to the summarizer.
pub struct SummaryBufferMemory {
    buffer: Vec<ChatMessage>,
    summary: String,
    max_token_limit: usize,
    summarizer: Arc<dyn LanguageModel>,
    counter: TokenCounter,
}

impl SummaryBufferMemory {
    /// Create an empty memory summarizing with `summarizer`.
    pub fn new(
        summarizer: Arc<dyn LanguageModel>,
        max_token_limit: usize,
        counter: TokenCounter,
    ) -> Self {
        Self {
            buffer: Vec::new(),
            summary: String::new(),
            max_token_limit,
            summarizer,
            counter,
        }
    }

    /// Running summary of pruned turns; empty until the first prune.
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Number of leading messages that must leave the buffer to fit the budget.
    fn overflow(&self) -> usize {
        let mut start = 0;
        while start < self.buffer.len()
            && (self.counter)(&render_lines(&self.buffer[start..])) > self.max_token_limit
        {
            start += 1;
        }
        start
    }

    async fn prune(&mut self) -> Result<(), MemoryError> {
        let overflow = self.overflow();
        if overflow == 0 {
            return Ok(());
        }

        let new_lines = render_lines(&self.buffer[..overflow]);
        let prompt = summary_prompt(&self.summary, &new_lines);
        // The buffer is only trimmed once the summary exists.
        let summary = self.summarizer.generate(&prompt).await?;
        self.buffer.drain(..overflow);
        self.summary = summary.trim().to_string();
        tracing::debug!(
            pruned = overflow,
            remaining = self.buffer.len(),
            "Folded old turns into conversation summary"
        );
        Ok(())
    }
}

fn summary_prompt(summary: &str, new_lines: &str) -> String {
    format!(
        "Progressively summarize the lines of conversation provided, adding onto the previous \
         summary and returning a new summary.\n\n\
         Current summary:\n{summary}\n\n\
         New lines of conversation:\n{new_lines}\n\n\
         New summary:"
    )
}

#[async_trait]
impl ConversationMemory for SummaryBufferMemory {
    fn load(&self) -> String {
        let recent = render_lines(&self.buffer);
        if self.summary.is_empty() {
            recent
        } else if recent.is_empty() {
            format!("System: {}", self.summary)
        } else {
            format!("System: {}\n{recent}", self.summary)
        }
    }

    async fn save(&mut self, user_text: &str, bot_text: &str) -> Result<(), MemoryError> {
        self.buffer.extend(ChatMessage::pair(user_text, bot_text));
        self.prune().await
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.summary.clear();
    }

    fn messages(&self) -> &[ChatMessage] {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSummarizer {
        prompts: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl LanguageModel for RecordingSummarizer {
        fn model_name(&self) -> &str {
            "summarizer"
        }

        async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
            self.prompts.lock().expect("prompts").push(prompt.to_string());
            if self.fail {
                Err(LlmError::Unavailable("offline".into()))
            } else {
                Ok("  The user reported a fever.  ".into())
            }
        }
    }

    fn word_counter() -> TokenCounter {
        Arc::new(|segment: &str| segment.split_whitespace().count())
    }

    #[tokio::test]
    async fn history_renders_turns_in_order() {
        let summarizer = Arc::new(RecordingSummarizer::default());
        let mut memory = SummaryBufferMemory::new(summarizer.clone(), 1024, word_counter());

        memory.save("hi", "hello").await.expect("save");
        memory.save("how are you", "fine").await.expect("save");

        assert_eq!(memory.load(), "Human: hi\nAI: hello\nHuman: how are you\nAI: fine");
        assert!(summarizer.prompts.lock().expect("prompts").is_empty());
    }

    #[tokio::test]
    async fn exceeding_budget_folds_oldest_turns_into_summary() {
        let summarizer = Arc::new(RecordingSummarizer::default());
        // The first turn is exactly 7 words; the second pushes the buffer to 11.
        let mut memory = SummaryBufferMemory::new(summarizer.clone(), 7, word_counter());

        memory.save("fever", "rest and drink water").await.expect("save");
        memory.save("thanks", "welcome").await.expect("save");

        let prompts = summarizer.prompts.lock().expect("prompts");
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Human: fever\nAI: rest and drink water"));
        assert!(!prompts[0].contains("thanks"));
        drop(prompts);

        assert_eq!(memory.summary(), "The user reported a fever.");
        assert_eq!(
            memory.load(),
            "System: The user reported a fever.\nHuman: thanks\nAI: welcome"
        );
        assert_eq!(memory.messages().len(), 2);
    }

    #[tokio::test]
    async fn failed_summary_keeps_messages() {
        let summarizer = Arc::new(RecordingSummarizer {
            fail: true,
            ..Default::default()
        });
        let mut memory = SummaryBufferMemory::new(summarizer, 2, word_counter());

        let error = memory.save("I have a fever", "rest").await.unwrap_err();

        assert!(matches!(error, MemoryError::Summarization(_)));
        assert_eq!(memory.messages().len(), 2);
        assert_eq!(memory.load(), "Human: I have a fever\nAI: rest");
        assert!(memory.summary().is_empty());
    }

    #[tokio::test]
    async fn clear_drops_summary_and_buffer() {
        let summarizer = Arc::new(RecordingSummarizer::default());
        let mut memory = SummaryBufferMemory::new(summarizer, 4, word_counter());
        memory.save("I have a fever", "rest").await.expect("save");

        memory.clear();

        assert!(memory.load().is_empty());
        assert!(memory.summary().is_empty());
    }

    #[test]
    fn cl100k_counter_counts_tokens() {
        let counter = cl100k_counter().expect("tokenizer");
        assert!(counter("I have a headache and fever") > 0);
        assert_eq!(counter(""), 0);
    }
}
