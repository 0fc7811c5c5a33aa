//! Language model abstraction and the Ollama adapter.
//!
//! Every reply, and every summary the summary-buffer memory writes, goes through
//! [`LanguageModel`]. The Ollama client talks to `/api/generate` directly over HTTP. A blocking
//! call returns the whole completion, and the streaming call yields tokens as the runtime emits
//! them.

use crate::classifier::ModelChoice;
use crate::config::Config;
use async_stream::try_stream;
use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced while generating text.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Runtime unreachable or the model is not installed.
    #[error("Language model unavailable: {0}")]
    Unavailable(String),
    /// Runtime returned an error response.
    #[error("Failed to generate text: {0}")]
    GenerationFailed(String),
    /// Runtime response could not be parsed.
    #[error("Malformed model response: {0}")]
    InvalidResponse(String),
}

/// Incremental tokens of one completion.
pub type TokenStream<'a> = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send + 'a>>;

/// Sampling parameters applied to every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationConfig {
    /// Upper bound on generated tokens.
    pub max_new_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 512,
            temperature: 0.7,
        }
    }
}

/// Interface implemented by text generation backends.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Identifier of the underlying model, for logs.
    fn model_name(&self) -> &str;

    /// Generate the full completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;

    /// Stream the completion for `prompt` token by token.
    ///
    /// Backends without native streaming yield the whole completion as a single item.
    fn generate_stream<'a>(&'a self, prompt: &'a str) -> TokenStream<'a> {
        Box::pin(try_stream! {
            let text = self.generate(prompt).await?;
            yield text;
        })
    }
}

/// The two chat models the router chooses between.
#[derive(Clone)]
pub struct ModelSet {
    /// Model for utterances classified as medical.
    pub medical: Arc<dyn LanguageModel>,
    /// Model for everything else.
    pub general: Arc<dyn LanguageModel>,
}

impl ModelSet {
    /// Model handle for a routing decision.
    pub fn select(&self, choice: ModelChoice) -> Arc<dyn LanguageModel> {
        match choice {
            ModelChoice::Medical => self.medical.clone(),
            ModelChoice::General => self.general.clone(),
        }
    }
}

/// Text generation against a model served by Ollama.
pub struct OllamaLanguageModel {
    http: Client,
    base_url: String,
    model: String,
    generation: GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaLanguageModel {
    /// Build a client for `model` at `base_url`.
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
            generation,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response, LlmError> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": stream,
            "options": {
                "num_predict": self.generation.max_new_tokens,
                "temperature": self.generation.temperature,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                LlmError::Unavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Unavailable(format!(
                "model '{}' not found: {body}",
                self.model
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl LanguageModel for OllamaLanguageModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        tracing::debug!(
            model = %self.model,
            prompt_chars = prompt.len(),
            "Generating completion"
        );
        let response = self.send(prompt, false).await?;
        let body: GenerateResponse = response.json().await.map_err(|error| {
            LlmError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if let Some(error) = body.error {
            return Err(LlmError::GenerationFailed(error));
        }
        if !body.done {
            return Err(LlmError::InvalidResponse("Ollama response incomplete".into()));
        }
        Ok(body.response)
    }

    fn generate_stream<'a>(&'a self, prompt: &'a str) -> TokenStream<'a> {
        Box::pin(try_stream! {
            let response = self.send(prompt, true).await?;
            let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|error| {
                    LlmError::Unavailable(format!("stream interrupted: {error}"))
                })?;
                buffer.extend_from_slice(&chunk);

                while let Some(newline) = buffer.iter().position(|byte| *byte == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=newline).collect();
                    if let Some(token) = parse_stream_line(&line)? {
                        yield token;
                    }
                }
            }

            if let Some(token) = parse_stream_line(&buffer)? {
                yield token;
            }
        })
    }
}

/// Decode one NDJSON line of a streaming response into its token, if any.
fn parse_stream_line(line: &[u8]) -> Result<Option<String>, LlmError> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let chunk: GenerateResponse = serde_json::from_str(text).map_err(|error| {
        LlmError::InvalidResponse(format!("failed to decode stream chunk: {error}"))
    })?;
    if let Some(error) = chunk.error {
        return Err(LlmError::GenerationFailed(error));
    }
    Ok((!chunk.response.is_empty()).then_some(chunk.response))
}

/// Ask the Ollama runtime to download `model` if it is not installed yet.
pub async fn pull_model(http: &Client, base_url: &str, model: &str) -> Result<(), LlmError> {
    tracing::info!(model, "Pulling model weights");
    let response = http
        .post(format!("{}/api/pull", base_url.trim_end_matches('/')))
        .json(&json!({ "model": model, "stream": false }))
        .send()
        .await
        .map_err(|error| LlmError::Unavailable(format!("failed to reach Ollama: {error}")))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::GenerationFailed(format!(
            "pull of '{model}' returned {status}: {body}"
        )));
    }
    tracing::info!(model, "Model available");
    Ok(())
}

/// Build the medical and general models described by the configuration.
pub fn build_model_set(config: &Config) -> reqwest::Result<ModelSet> {
    let http = config.http_client("medchat/llm")?;
    let generation = GenerationConfig {
        max_new_tokens: config.llm_max_new_tokens,
        temperature: config.llm_temperature,
    };
    let model = |name: &str| -> Arc<dyn LanguageModel> {
        Arc::new(OllamaLanguageModel::new(
            http.clone(),
            config.ollama_url.clone(),
            name,
            generation,
        ))
    };
    Ok(ModelSet {
        medical: model(&config.medical_model),
        general: model(&config.general_model),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn client(server: &MockServer) -> OllamaLanguageModel {
        OllamaLanguageModel::new(
            Client::builder()
                .user_agent("medchat-test")
                .build()
                .expect("client"),
            server.base_url(),
            "biomistral",
            GenerationConfig::default(),
        )
    }

    #[tokio::test]
    async fn generate_sends_generation_options_and_returns_raw_text() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate").json_body(json!({
                    "model": "biomistral",
                    "prompt": "Hello",
                    "stream": false,
                    "options": { "num_predict": 512, "temperature": 0.7 }
                }));
                then.status(200).json_body(json!({
                    "response": "  Rest and drink water.\n",
                    "done": true
                }));
            })
            .await;

        let text = client(&server).generate("Hello").await.expect("completion");

        mock.assert();
        assert_eq!(text, "  Rest and drink water.\n");
    }

    #[tokio::test]
    async fn generate_reports_missing_model() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(404).json_body(json!({ "error": "model not found" }));
            })
            .await;

        let error = client(&server).generate("Hello").await.unwrap_err();
        assert!(matches!(error, LlmError::Unavailable(_)));
    }

    #[tokio::test]
    async fn generate_stream_yields_tokens_in_order() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .json_body_partial(r#"{ "stream": true }"#);
                then.status(200).body(
                    "{\"response\":\"Rest\",\"done\":false}\n\
                     {\"response\":\" well\",\"done\":false}\n\
                     {\"response\":\"\",\"done\":true}\n",
                );
            })
            .await;

        let model = client(&server);
        let tokens: Vec<String> = model
            .generate_stream("Hello")
            .map(|token| token.expect("token"))
            .collect()
            .await;

        assert_eq!(tokens, ["Rest", " well"]);
    }

    #[test]
    fn stream_line_with_error_fails() {
        let error = parse_stream_line(br#"{"error":"out of memory"}"#).unwrap_err();
        assert!(matches!(error, LlmError::GenerationFailed(message) if message == "out of memory"));
    }

    #[tokio::test]
    async fn pull_model_posts_model_name() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/pull")
                    .json_body(json!({ "model": "llama2", "stream": false }));
                then.status(200).json_body(json!({ "status": "success" }));
            })
            .await;

        pull_model(&Client::new(), &server.base_url(), "llama2")
            .await
            .expect("pull");
        mock.assert();
    }
}
