//! Core data types and error definitions for the ingestion pipeline.

use crate::{embedding::EmbeddingClientError, pinecone::PineconeError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible chunk budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// Errors emitted by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The PDF folder exists but could not be listed.
    #[error("Failed to read PDF folder {path}: {source}")]
    Folder {
        /// Folder that was scanned.
        path: PathBuf,
        /// Underlying directory walk failure.
        #[source]
        source: walkdir::Error,
    },
    /// Chunking step failed to segment the documents.
    #[error("Failed to chunk documents: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors for a batch.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Vector database rejected an upsert.
    #[error("Vector index request failed: {0}")]
    Index(#[from] PineconeError),
}

/// Text extracted from one page of a PDF file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Path of the PDF the text came from.
    pub source: String,
    /// One-based page number within the file.
    pub page: usize,
    /// Extracted text.
    pub text: String,
}

/// A bounded slice of a source document; the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    /// Chunk text, never empty.
    pub text: String,
    /// Path of the PDF the chunk was cut from.
    pub source: String,
    /// Page the chunk was cut from.
    pub page: usize,
    /// Position in the flat chunk sequence of one ingestion run.
    pub sequence_index: usize,
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    /// PDF files that yielded text.
    pub documents: usize,
    /// Chunks produced across all documents.
    pub chunks: usize,
    /// Records acknowledged by the vector index.
    pub upserted: usize,
}
