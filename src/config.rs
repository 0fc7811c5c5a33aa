use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_PINECONE_CONTROL_URL: &str = "https://api.pinecone.io";
const DEFAULT_INDEX_NAME: &str = "medbase";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_CLASSIFIER_URL: &str =
    "https://api-inference.huggingface.co/models/facebook/bart-large-mnli";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the chatbot and its ingestion pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Bearer credential for the vector database. Never compiled in.
    pub pinecone_api_key: String,
    /// Control-plane base URL of the vector database.
    pub pinecone_control_url: String,
    /// Name of the index holding document chunks.
    pub pinecone_index_name: String,
    /// Serverless cloud used when the index has to be created.
    pub pinecone_cloud: String,
    /// Serverless region used when the index has to be created.
    pub pinecone_region: String,
    /// Similarity metric used when the index has to be created.
    pub pinecone_metric: Metric,
    /// Delay between readiness checks while a new index initializes.
    pub index_poll_interval: Duration,
    /// Number of records sent per upsert request.
    pub upsert_batch_size: usize,
    /// Folder scanned for `*.pdf` files at startup.
    pub pdf_folder: PathBuf,
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Embedding backend used for chunks and queries.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the Ollama runtime serving embeddings and generation.
    pub ollama_url: String,
    /// Model answering utterances classified as medical.
    pub medical_model: String,
    /// Model answering everything else.
    pub general_model: String,
    /// Generation budget per reply.
    pub llm_max_new_tokens: u32,
    /// Sampling temperature per reply.
    pub llm_temperature: f64,
    /// Ask Ollama to pull both chat models during startup.
    pub ollama_pull_models: bool,
    /// Zero-shot classification endpoint.
    pub classifier_url: String,
    /// Optional bearer token for the classification endpoint.
    pub classifier_api_key: Option<String>,
    /// Number of chunks retrieved per turn.
    pub retrieval_top_k: usize,
    /// Memory variant created for new sessions.
    pub memory_kind: MemoryKind,
    /// Token budget of the summary-buffer memory.
    pub memory_max_token_limit: usize,
    /// Idle time after which a session is evicted; `None` keeps sessions forever.
    pub session_idle_ttl: Option<Duration>,
    /// Per-request timeout for outbound HTTP calls; `None` waits indefinitely.
    pub http_timeout: Option<Duration>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic offline hashing, useful for demos and tests.
    Hash,
}

/// Similarity metric of the vector index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Raw inner product.
    DotProduct,
    /// Cosine similarity.
    Cosine,
    /// Euclidean distance.
    Euclidean,
}

impl Metric {
    /// Wire name understood by the vector database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DotProduct => "dotproduct",
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
        }
    }
}

/// Conversation memory variant selected for new sessions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// Running LLM summary plus a token-bounded buffer of recent turns.
    Summary,
    /// Verbatim, timestamped message log.
    Timestamped,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pinecone_api_key: String::new(),
            pinecone_control_url: DEFAULT_PINECONE_CONTROL_URL.to_string(),
            pinecone_index_name: DEFAULT_INDEX_NAME.to_string(),
            pinecone_cloud: "aws".to_string(),
            pinecone_region: "us-east-1".to_string(),
            pinecone_metric: Metric::DotProduct,
            index_poll_interval: Duration::from_millis(1000),
            upsert_batch_size: 100,
            pdf_folder: PathBuf::from("data"),
            chunk_size: 400,
            chunk_overlap: 40,
            embedding_provider: EmbeddingProvider::Ollama,
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dimension: 768,
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            medical_model: "cniongolo/biomistral".to_string(),
            general_model: "llama2".to_string(),
            llm_max_new_tokens: 512,
            llm_temperature: 0.7,
            ollama_pull_models: false,
            classifier_url: DEFAULT_CLASSIFIER_URL.to_string(),
            classifier_api_key: None,
            retrieval_top_k: 4,
            memory_kind: MemoryKind::Summary,
            memory_max_token_limit: 1024,
            session_idle_ttl: None,
            http_timeout: None,
            server_port: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let pinecone_api_key = load_env_optional("PINECONE_API_KEY")
            .ok_or_else(|| ConfigError::MissingVariable("PINECONE_API_KEY".to_string()))?;

        Ok(Self {
            pinecone_api_key,
            pinecone_control_url: load_env_optional("PINECONE_CONTROL_URL")
                .unwrap_or(defaults.pinecone_control_url),
            pinecone_index_name: load_env_optional("PINECONE_INDEX_NAME")
                .unwrap_or(defaults.pinecone_index_name),
            pinecone_cloud: load_env_optional("PINECONE_CLOUD").unwrap_or(defaults.pinecone_cloud),
            pinecone_region: load_env_optional("PINECONE_REGION")
                .unwrap_or(defaults.pinecone_region),
            pinecone_metric: parse_optional("PINECONE_METRIC")?.unwrap_or(defaults.pinecone_metric),
            index_poll_interval: parse_optional("INDEX_POLL_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.index_poll_interval),
            upsert_batch_size: parse_optional::<usize>("UPSERT_BATCH_SIZE")?
                .map(|size| size.max(1))
                .unwrap_or(defaults.upsert_batch_size),
            pdf_folder: load_env_optional("PDF_FOLDER")
                .map(PathBuf::from)
                .unwrap_or(defaults.pdf_folder),
            chunk_size: parse_optional("TEXT_SPLITTER_CHUNK_SIZE")?.unwrap_or(defaults.chunk_size),
            chunk_overlap: parse_optional("TEXT_SPLITTER_CHUNK_OVERLAP")?
                .unwrap_or(defaults.chunk_overlap),
            embedding_provider: parse_optional("EMBEDDING_PROVIDER")?
                .unwrap_or(defaults.embedding_provider),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            embedding_dimension: parse_optional("EMBEDDING_DIMENSION")?
                .unwrap_or(defaults.embedding_dimension),
            ollama_url: load_env_optional("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            medical_model: load_env_optional("MEDICAL_MODEL").unwrap_or(defaults.medical_model),
            general_model: load_env_optional("GENERAL_MODEL").unwrap_or(defaults.general_model),
            llm_max_new_tokens: parse_optional("LLM_MAX_NEW_TOKENS")?
                .unwrap_or(defaults.llm_max_new_tokens),
            llm_temperature: parse_optional("LLM_TEMPERATURE")?
                .unwrap_or(defaults.llm_temperature),
            ollama_pull_models: load_env_optional("OLLAMA_PULL_MODELS")
                .map(|value| parse_flag("OLLAMA_PULL_MODELS", &value))
                .transpose()?
                .unwrap_or(defaults.ollama_pull_models),
            classifier_url: load_env_optional("CLASSIFIER_URL")
                .unwrap_or(defaults.classifier_url),
            classifier_api_key: load_env_optional("CLASSIFIER_API_KEY"),
            retrieval_top_k: parse_optional::<usize>("RETRIEVAL_TOP_K")?
                .map(|k| k.max(1))
                .unwrap_or(defaults.retrieval_top_k),
            memory_kind: parse_optional("MEMORY_KIND")?.unwrap_or(defaults.memory_kind),
            memory_max_token_limit: parse_optional("MEMORY_MAX_TOKEN_LIMIT")?
                .unwrap_or(defaults.memory_max_token_limit),
            session_idle_ttl: parse_optional("SESSION_IDLE_TTL_SECS")?.map(Duration::from_secs),
            http_timeout: parse_optional("HTTP_TIMEOUT_SECS")?.map(Duration::from_secs),
            server_port: parse_optional("SERVER_PORT")?,
        })
    }

    /// Build an HTTP client honoring the optional outbound timeout.
    pub fn http_client(&self, user_agent: &str) -> reqwest::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().user_agent(user_agent.to_string());
        if let Some(timeout) = self.http_timeout {
            builder = builder.timeout(timeout);
        }
        builder.build()
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(key.to_string())),
    }
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl FromStr for Metric {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dotproduct" => Ok(Self::DotProduct),
            "cosine" => Ok(Self::Cosine),
            "euclidean" => Ok(Self::Euclidean),
            _ => Err(()),
        }
    }
}

impl FromStr for MemoryKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" | "summary_buffer" => Ok(Self::Summary),
            "timestamped" | "log" => Ok(Self::Timestamped),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        control_url = %config.pinecone_control_url,
        index = %config.pinecone_index_name,
        pdf_folder = %config.pdf_folder.display(),
        embedding_provider = ?config.embedding_provider,
        memory_kind = ?config.memory_kind,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
