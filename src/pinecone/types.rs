//! Shared types used by the Pinecone control-plane and data-plane clients.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned while interacting with the vector database.
#[derive(Debug, Error)]
pub enum PineconeError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Pinecone URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The service responded with an unexpected status code.
    #[error("Unexpected Pinecone response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// An index description did not carry a data-plane host.
    #[error("Index '{0}' has no host yet")]
    MissingHost(String),
    /// One upsert batch failed; earlier batches remain written.
    #[error("Upsert batch {batch} failed: {source}")]
    BatchFailed {
        /// Zero-based number of the failing batch.
        batch: usize,
        /// Underlying request failure.
        #[source]
        source: Box<PineconeError>,
    },
}

/// Metadata stored next to every chunk vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Position of the chunk in the ingestion sequence.
    pub chunk: usize,
    /// File the chunk was cut from.
    pub source: String,
    /// One-based page within `source`.
    #[serde(default)]
    pub page: usize,
    /// Chunk text returned to the retriever.
    #[serde(default)]
    pub text: Option<String>,
}

/// One `(id, vector, metadata)` triple owned by the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorRecord {
    /// Unique record identifier.
    pub id: String,
    /// Embedding of the chunk text.
    pub values: Vec<f32>,
    /// Chunk provenance and text.
    pub metadata: RecordMetadata,
}

/// Match returned by a similarity query.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoredRecord {
    /// Identifier of the matched record.
    pub id: String,
    /// Similarity score, larger is closer.
    pub score: f32,
    /// Metadata stored with the record, when the service returned it.
    #[serde(default)]
    pub metadata: Option<RecordMetadata>,
}

/// Serverless placement of a new index.
#[derive(Debug, Clone, Serialize)]
pub struct ServerlessSpec {
    /// Cloud provider, e.g. `aws`.
    pub cloud: String,
    /// Region inside the provider, e.g. `us-east-1`.
    pub region: String,
}

/// Readiness information reported by `describe index`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexStatus {
    /// True once the index accepts reads and writes.
    #[serde(default)]
    pub ready: bool,
    /// Provider state string such as `Initializing` or `Ready`.
    #[serde(default)]
    pub state: Option<String>,
}

/// Description of an index as returned by the control plane.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexDescription {
    /// Index name.
    pub name: String,
    /// Vector dimensionality.
    #[serde(default)]
    pub dimension: Option<usize>,
    /// Similarity metric.
    #[serde(default)]
    pub metric: Option<String>,
    /// Data-plane host serving this index.
    #[serde(default)]
    pub host: Option<String>,
    /// Readiness status.
    #[serde(default)]
    pub status: IndexStatus,
}

/// Counters describing a completed upsert call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    /// Records acknowledged by the service.
    pub upserted: usize,
    /// Requests issued.
    pub batches: usize,
}

#[derive(Deserialize)]
pub(crate) struct ListIndexesResponse {
    #[serde(default)]
    pub(crate) indexes: Vec<IndexDescription>,
}

#[derive(Deserialize)]
pub(crate) struct UpsertResponse {
    #[serde(default, rename = "upsertedCount")]
    pub(crate) upserted_count: Option<usize>,
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    #[serde(default)]
    pub(crate) matches: Vec<ScoredRecord>,
}
