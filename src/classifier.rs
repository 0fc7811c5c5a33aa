//! Zero-shot classification and medical/general model routing.

use crate::config::Config;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;

/// Candidate labels offered to the classifier, in this order.
pub const ROUTING_LABELS: [&str; 2] = ["medical", "general"];

/// Errors surfaced by the classification backend.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Backend unreachable.
    #[error("Classifier unavailable: {0}")]
    Unavailable(String),
    /// Backend returned an error status.
    #[error("Classifier request failed: {0}")]
    RequestFailed(String),
    /// Backend response could not be interpreted.
    #[error("Malformed classifier response: {0}")]
    InvalidResponse(String),
}

/// One label with the classifier's confidence in it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LabelScore {
    /// Candidate label.
    pub label: String,
    /// Confidence in `[0, 1]`.
    pub score: f32,
}

/// Interface implemented by zero-shot labellers.
#[async_trait]
pub trait ZeroShotClassifier: Send + Sync {
    /// Score `text` against `labels`, highest confidence first.
    async fn classify(
        &self,
        text: &str,
        labels: &[&str],
    ) -> Result<Vec<LabelScore>, ClassifierError>;
}

/// Zero-shot classifier behind a Hugging Face style inference endpoint.
pub struct HttpZeroShotClassifier {
    http: Client,
    url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Ranked { labels: Vec<String>, scores: Vec<f32> },
    Pairs(Vec<LabelScore>),
    Batched(Vec<Vec<LabelScore>>),
}

impl InferenceResponse {
    fn into_scores(self) -> Result<Vec<LabelScore>, ClassifierError> {
        match self {
            Self::Ranked { labels, scores } => {
                if labels.len() != scores.len() {
                    return Err(ClassifierError::InvalidResponse(format!(
                        "{} labels but {} scores",
                        labels.len(),
                        scores.len()
                    )));
                }
                Ok(labels
                    .into_iter()
                    .zip(scores)
                    .map(|(label, score)| LabelScore { label, score })
                    .collect())
            }
            Self::Pairs(pairs) => Ok(pairs),
            Self::Batched(batches) => Ok(batches.into_iter().next().unwrap_or_default()),
        }
    }
}

impl HttpZeroShotClassifier {
    /// Build a classifier posting to `url`, optionally with a bearer token.
    pub fn new(http: Client, url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            url: url.into(),
            api_key,
        }
    }

    /// Build a classifier from the loaded configuration.
    pub fn from_config(config: &Config) -> reqwest::Result<Self> {
        Ok(Self::new(
            config.http_client("medchat/classifier")?,
            config.classifier_url.clone(),
            config.classifier_api_key.clone(),
        ))
    }
}

#[async_trait]
impl ZeroShotClassifier for HttpZeroShotClassifier {
    async fn classify(
        &self,
        text: &str,
        labels: &[&str],
    ) -> Result<Vec<LabelScore>, ClassifierError> {
        let mut request = self.http.post(&self.url).json(&json!({
            "inputs": text,
            "parameters": { "candidate_labels": labels },
        }));
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|error| ClassifierError::Unavailable(error.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::RequestFailed(format!("{status}: {body}")));
        }

        let body: InferenceResponse = response
            .json()
            .await
            .map_err(|error| ClassifierError::InvalidResponse(error.to_string()))?;
        let mut scores = body.into_scores()?;
        scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        Ok(scores)
    }
}

/// Which chat model answers a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelChoice {
    /// Domain model for health questions.
    Medical,
    /// General-purpose model.
    General,
}

impl ModelChoice {
    /// Label the classifier uses for this choice.
    pub fn label(self) -> &'static str {
        match self {
            Self::Medical => "medical",
            Self::General => "general",
        }
    }
}

/// Picks the chat model for an utterance.
///
/// Any classifier failure, empty result, or unrecognized top label routes to
/// [`ModelChoice::General`] and is logged at `warn`.
#[derive(Clone)]
pub struct ModelRouter {
    classifier: Arc<dyn ZeroShotClassifier>,
}

impl ModelRouter {
    /// Build a router on top of a zero-shot classifier.
    pub fn new(classifier: Arc<dyn ZeroShotClassifier>) -> Self {
        Self { classifier }
    }

    /// Classify `user_text` and select the matching model.
    pub async fn route(&self, user_text: &str) -> ModelChoice {
        let scores = match self.classifier.classify(user_text, &ROUTING_LABELS).await {
            Ok(scores) => scores,
            Err(error) => {
                tracing::warn!(error = %error, "Classifier failed; routing to general model");
                return ModelChoice::General;
            }
        };

        let top = scores
            .iter()
            .filter(|candidate| candidate.score.is_finite())
            .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal));

        match top.map(|candidate| candidate.label.trim().to_lowercase()) {
            Some(label) if label == ModelChoice::Medical.label() => {
                tracing::debug!(label = %label, "Routed to medical model");
                ModelChoice::Medical
            }
            Some(label) if label == ModelChoice::General.label() => ModelChoice::General,
            other => {
                tracing::warn!(
                    label = ?other,
                    "Classifier returned no usable label; routing to general model"
                );
                ModelChoice::General
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    struct StaticClassifier(Result<Vec<LabelScore>, ()>);

    #[async_trait]
    impl ZeroShotClassifier for StaticClassifier {
        async fn classify(
            &self,
            _text: &str,
            _labels: &[&str],
        ) -> Result<Vec<LabelScore>, ClassifierError> {
            self.0
                .clone()
                .map_err(|()| ClassifierError::Unavailable("offline".into()))
        }
    }

    fn router(result: Result<Vec<LabelScore>, ()>) -> ModelRouter {
        ModelRouter::new(Arc::new(StaticClassifier(result)))
    }

    fn score(label: &str, score: f32) -> LabelScore {
        LabelScore {
            label: label.into(),
            score,
        }
    }

    #[tokio::test]
    async fn medical_label_selects_medical_model() {
        let router = router(Ok(vec![score("medical", 0.9)]));
        assert_eq!(
            router.route("I have a headache and fever").await,
            ModelChoice::Medical
        );
    }

    #[tokio::test]
    async fn highest_score_wins_regardless_of_order() {
        let router = router(Ok(vec![score("general", 0.2), score("medical", 0.8)]));
        assert_eq!(router.route("my knee hurts").await, ModelChoice::Medical);
    }

    #[tokio::test]
    async fn classifier_error_fails_open_to_general() {
        assert_eq!(router(Err(())).route("fever").await, ModelChoice::General);
    }

    #[tokio::test]
    async fn empty_or_unknown_labels_fail_open_to_general() {
        assert_eq!(router(Ok(vec![])).route("fever").await, ModelChoice::General);
        assert_eq!(
            router(Ok(vec![score("legal", 0.99)])).route("fever").await,
            ModelChoice::General
        );
    }

    #[tokio::test]
    async fn http_classifier_reads_ranked_response() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/models/bart")
                    .header("authorization", "Bearer hf-token")
                    .json_body(json!({
                        "inputs": "I have a fever",
                        "parameters": { "candidate_labels": ["medical", "general"] }
                    }));
                then.status(200).json_body(json!({
                    "sequence": "I have a fever",
                    "labels": ["general", "medical"],
                    "scores": [0.1, 0.9]
                }));
            })
            .await;

        let classifier = HttpZeroShotClassifier::new(
            Client::new(),
            format!("{}/models/bart", server.base_url()),
            Some("hf-token".into()),
        );
        let scores = classifier
            .classify("I have a fever", &ROUTING_LABELS)
            .await
            .expect("scores");

        mock.assert();
        assert_eq!(scores[0], score("medical", 0.9));
        assert_eq!(scores[1], score("general", 0.1));
    }

    #[tokio::test]
    async fn http_classifier_reads_pair_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/classify");
                then.status(200)
                    .json_body(json!([{ "label": "medical", "score": 0.9 }]));
            })
            .await;

        let classifier = HttpZeroShotClassifier::new(
            Client::new(),
            format!("{}/classify", server.base_url()),
            None,
        );
        let scores = classifier
            .classify("headache", &ROUTING_LABELS)
            .await
            .expect("scores");
        assert_eq!(scores, vec![score("medical", 0.9)]);
    }

    #[tokio::test]
    async fn http_classifier_surfaces_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/classify");
                then.status(503).body("loading");
            })
            .await;

        let classifier = HttpZeroShotClassifier::new(
            Client::new(),
            format!("{}/classify", server.base_url()),
            None,
        );
        let error = classifier
            .classify("headache", &ROUTING_LABELS)
            .await
            .unwrap_err();
        assert!(matches!(error, ClassifierError::RequestFailed(message) if message.contains("503")));
    }
}
