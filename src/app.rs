//! Application services shared by the HTTP server and the CLI.

use crate::chat::{ChatService, ReplyStream};
use crate::classifier::{HttpZeroShotClassifier, ModelRouter};
use crate::config::{Config, EmbeddingProvider, get_config};
use crate::embedding::{EmbeddingClient, get_embedding_client};
use crate::ingest::{IngestError, IngestOutcome, IngestionService};
use crate::llm::{build_model_set, pull_model};
use crate::memory::{SessionSnapshot, SessionStore, memory_factory, spawn_idle_eviction};
use crate::metrics::{ChatMetrics, MetricsSnapshot};
use crate::pinecone::{PineconeService, ServerlessSpec, VectorIndex};
use crate::retrieval::Retriever;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Operations the outer surfaces need from the chatbot.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Run one interactive turn and return the session transcript.
    async fn chat(&self, session_id: &str, message: &str) -> Vec<(String, String)>;

    /// Stream the reply to `message` fragment by fragment.
    fn chat_stream<'a>(&'a self, session_id: &'a str, message: &'a str) -> ReplyStream<'a>;

    /// Ids of live sessions.
    fn session_ids(&self) -> Vec<String>;

    /// State of one session, `None` when it does not exist.
    async fn session(&self, session_id: &str) -> Option<SessionSnapshot>;

    /// Empty a session's memory; `false` when it does not exist.
    async fn clear_session(&self, session_id: &str) -> bool;

    /// Drop a session; `false` when it does not exist.
    fn remove_session(&self, session_id: &str) -> bool;

    /// Re-ingest the configured PDF folder.
    async fn ingest(&self) -> Result<IngestOutcome, IngestError>;

    /// Current counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Fully wired chatbot: index, ingestion, sessions, router, and models.
pub struct ChatApp {
    chat: ChatService,
    ingestion: IngestionService,
    pdf_folder: PathBuf,
}

impl ChatApp {
    /// Build every collaborator from the global configuration and populate the index.
    ///
    /// Fails fast when the vector index cannot be reached or created.
    pub async fn new() -> Self {
        let config = get_config();

        if config.ollama_pull_models {
            pull_configured_models(config).await;
        }

        tracing::info!("Initializing embedding client");
        let embedding_client: Arc<dyn EmbeddingClient> = Arc::from(
            get_embedding_client(config).expect("Failed to build embedding HTTP client"),
        );

        let pinecone = PineconeService::new(config).expect("Failed to configure Pinecone client");
        let spec = ServerlessSpec {
            cloud: config.pinecone_cloud.clone(),
            region: config.pinecone_region.clone(),
        };
        let index: Arc<dyn VectorIndex> = Arc::new(
            pinecone
                .ensure_index(
                    &config.pinecone_index_name,
                    config.embedding_dimension,
                    config.pinecone_metric,
                    &spec,
                )
                .await
                .expect("Failed to ensure Pinecone index exists"),
        );

        let metrics = Arc::new(ChatMetrics::new());
        let ingestion = IngestionService::new(
            embedding_client.clone(),
            index.clone(),
            metrics.clone(),
            config.chunk_size,
            config.chunk_overlap,
            config.upsert_batch_size,
        );
        if let Err(error) = ingestion.ingest_folder(&config.pdf_folder).await {
            tracing::error!(
                error = %error,
                "Startup ingestion failed; continuing with existing index"
            );
        }

        let models = build_model_set(config).expect("Failed to build language model HTTP client");
        let factory = memory_factory(
            config.memory_kind,
            models.general.clone(),
            config.memory_max_token_limit,
        )
        .expect("Failed to initialize conversation memory");
        let sessions = Arc::new(SessionStore::new(factory));
        if let Some(ttl) = config.session_idle_ttl {
            spawn_idle_eviction(sessions.clone(), ttl);
        }

        let classifier = HttpZeroShotClassifier::from_config(config)
            .expect("Failed to build classifier HTTP client");
        let chat = ChatService::new(
            ModelRouter::new(Arc::new(classifier)),
            Arc::new(Retriever::new(
                embedding_client,
                index,
                config.retrieval_top_k,
            )),
            sessions,
            models,
            metrics,
        );

        Self {
            chat,
            ingestion,
            pdf_folder: config.pdf_folder.clone(),
        }
    }
}

async fn pull_configured_models(config: &Config) {
    let http = match config.http_client("medchat/pull") {
        Ok(http) => http,
        Err(error) => {
            tracing::warn!(error = %error, "Skipping model pull; HTTP client unavailable");
            return;
        }
    };

    let mut models = vec![config.medical_model.as_str(), config.general_model.as_str()];
    if config.embedding_provider == EmbeddingProvider::Ollama {
        models.push(config.embedding_model.as_str());
    }
    for model in models {
        if let Err(error) = pull_model(&http, &config.ollama_url, model).await {
            tracing::warn!(model, error = %error, "Model pull failed");
        }
    }
}

#[async_trait]
impl ChatApi for ChatApp {
    async fn chat(&self, session_id: &str, message: &str) -> Vec<(String, String)> {
        self.chat.handle_turn(session_id, message).await
    }

    fn chat_stream<'a>(&'a self, session_id: &'a str, message: &'a str) -> ReplyStream<'a> {
        self.chat.respond_stream(session_id, message)
    }

    fn session_ids(&self) -> Vec<String> {
        self.chat.sessions().session_ids()
    }

    async fn session(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.chat.sessions().snapshot(session_id).await
    }

    async fn clear_session(&self, session_id: &str) -> bool {
        self.chat.sessions().clear(session_id).await
    }

    fn remove_session(&self, session_id: &str) -> bool {
        self.chat.sessions().remove(session_id)
    }

    async fn ingest(&self) -> Result<IngestOutcome, IngestError> {
        self.ingestion.ingest_folder(&self.pdf_folder).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.chat.metrics().snapshot()
    }
}
