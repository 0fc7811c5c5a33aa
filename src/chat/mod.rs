//! Per-turn response pipeline.
//!
//! A turn runs as one linear chain while holding the session lock: load history, route the
//! utterance, retrieve context, build the prompt, generate, save. Any failure before the reply
//! exists becomes [`APOLOGY`]; a failure while saving is logged and the reply is still returned.

mod prompt;

pub use prompt::build_prompt;

use crate::classifier::{ModelChoice, ModelRouter};
use crate::llm::{LlmError, ModelSet};
use crate::memory::{SessionState, SessionStore};
use crate::metrics::ChatMetrics;
use crate::retrieval::{ContextRetriever, RetrievalError};
use async_stream::stream;
use futures_core::Stream;
use futures_util::StreamExt;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Reply substituted for any failure inside a turn.
pub const APOLOGY: &str = "Sorry, an error occurred while processing your input.";
/// Reply to an empty message.
pub const GREETING: &str = "Hi there! How can I help you today?";
/// Reply to `exit`.
pub const EXIT_MESSAGE: &str = "Exiting the chat session.";

/// Errors that turn a reply into [`APOLOGY`].
#[derive(Debug, Error)]
pub enum ChatError {
    /// Supporting context could not be fetched.
    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),
    /// The selected model failed to answer.
    #[error("Generation failed: {0}")]
    Generation(#[from] LlmError),
}

/// Text fragments of a streamed reply. The stream never fails; errors surface as [`APOLOGY`].
pub type ReplyStream<'a> = Pin<Box<dyn Stream<Item = String> + Send + 'a>>;

/// Orchestrates routing, retrieval, memory, and generation for chat turns.
#[derive(Clone)]
pub struct ChatService {
    router: ModelRouter,
    retriever: Arc<dyn ContextRetriever>,
    sessions: Arc<SessionStore>,
    models: ModelSet,
    metrics: Arc<ChatMetrics>,
}

impl ChatService {
    /// Wire the collaborators of the turn pipeline.
    pub fn new(
        router: ModelRouter,
        retriever: Arc<dyn ContextRetriever>,
        sessions: Arc<SessionStore>,
        models: ModelSet,
        metrics: Arc<ChatMetrics>,
    ) -> Self {
        Self {
            router,
            retriever,
            sessions,
            models,
            metrics,
        }
    }

    /// Session registry backing this service.
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Shared counters.
    pub fn metrics(&self) -> &Arc<ChatMetrics> {
        &self.metrics
    }

    /// Answer `user_text` in the context of `session_id`. Never fails.
    pub async fn respond(&self, session_id: &str, user_text: &str) -> String {
        let session = self.sessions.get_or_create(session_id);
        let mut state = session.lock().await;
        let reply = self.respond_locked(&mut state, session_id, user_text).await;
        state.transcript.push((user_text.to_string(), reply.clone()));
        reply
    }

    /// Run one interactive turn and return the session's transcript.
    ///
    /// Blank input is answered with [`GREETING`] and `exit` (any case) with [`EXIT_MESSAGE`],
    /// both judged after trimming surrounding whitespace; neither reaches the models or the
    /// memory.
    pub async fn handle_turn(&self, session_id: &str, user_text: &str) -> Vec<(String, String)> {
        let session = self.sessions.get_or_create(session_id);
        let mut state = session.lock().await;
        let reply = match canned_reply(user_text) {
            Some(reply) => reply.to_string(),
            None => self.respond_locked(&mut state, session_id, user_text).await,
        };
        state.transcript.push((user_text.to_string(), reply));
        state.transcript.clone()
    }

    /// Stream the answer to `user_text`, then persist the full reply.
    ///
    /// A failure before the first fragment yields [`APOLOGY`] alone. A failure mid-stream
    /// appends [`APOLOGY`] after the fragments already sent, and the turn is not saved.
    pub fn respond_stream<'a>(
        &'a self,
        session_id: &'a str,
        user_text: &'a str,
    ) -> ReplyStream<'a> {
        Box::pin(stream! {
            let session = self.sessions.get_or_create(session_id);
            let mut state = session.lock().await;

            if let Some(reply) = canned_reply(user_text) {
                state.transcript.push((user_text.to_string(), reply.to_string()));
                yield reply.to_string();
                return;
            }

            let history = state.memory.load();
            let choice = self.router.route(user_text).await;
            let prompt = match self.prompt_for(&history, user_text).await {
                Ok(prompt) => prompt,
                Err(error) => {
                    self.record_failure(session_id, choice, &error);
                    state.transcript.push((user_text.to_string(), APOLOGY.to_string()));
                    yield APOLOGY.to_string();
                    return;
                }
            };

            let model = self.models.select(choice);
            let mut tokens = model.generate_stream(&prompt);
            let mut reply = String::new();
            while let Some(token) = tokens.next().await {
                match token {
                    Ok(token) => {
                        reply.push_str(&token);
                        yield token;
                    }
                    Err(error) => {
                        self.record_failure(session_id, choice, &ChatError::Generation(error));
                        state.transcript.push((user_text.to_string(), APOLOGY.to_string()));
                        yield APOLOGY.to_string();
                        return;
                    }
                }
            }

            self.persist(&mut state, session_id, user_text, &reply).await;
            self.metrics.record_turn(choice == ModelChoice::Medical, false);
            state.transcript.push((user_text.to_string(), reply));
        })
    }

    async fn respond_locked(
        &self,
        state: &mut SessionState,
        session_id: &str,
        user_text: &str,
    ) -> String {
        let history = state.memory.load();
        let choice = self.router.route(user_text).await;

        match self.generate(choice, &history, user_text).await {
            Ok(reply) => {
                self.persist(state, session_id, user_text, &reply).await;
                self.metrics.record_turn(choice == ModelChoice::Medical, false);
                reply
            }
            Err(error) => {
                self.record_failure(session_id, choice, &error);
                APOLOGY.to_string()
            }
        }
    }

    async fn prompt_for(&self, history: &str, user_text: &str) -> Result<String, ChatError> {
        let context = self.retriever.retrieve(user_text).await?;
        Ok(build_prompt(history, user_text, &context))
    }

    async fn generate(
        &self,
        choice: ModelChoice,
        history: &str,
        user_text: &str,
    ) -> Result<String, ChatError> {
        let prompt = self.prompt_for(history, user_text).await?;
        let model = self.models.select(choice);
        tracing::debug!(model = model.model_name(), route = choice.label(), "Invoking model");
        Ok(model.generate(&prompt).await?)
    }

    async fn persist(
        &self,
        state: &mut SessionState,
        session_id: &str,
        user_text: &str,
        reply: &str,
    ) {
        if let Err(error) = state.memory.save(user_text, reply).await {
            tracing::warn!(session_id, error = %error, "Failed to update conversation memory");
        }
    }

    fn record_failure(&self, session_id: &str, choice: ModelChoice, error: &ChatError) {
        tracing::error!(session_id, route = choice.label(), error = %error, "Chat turn failed");
        self.metrics.record_turn(choice == ModelChoice::Medical, true);
    }
}

fn canned_reply(user_text: &str) -> Option<&'static str> {
    let trimmed = user_text.trim();
    if trimmed.is_empty() {
        Some(GREETING)
    } else if trimmed.eq_ignore_ascii_case("exit") {
        Some(EXIT_MESSAGE)
    } else {
        None
    }
}
