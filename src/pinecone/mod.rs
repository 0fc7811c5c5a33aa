//! Pinecone vector database integration.

pub mod client;
pub mod types;

pub use client::{IndexHandle, PineconeService, VectorIndex};
pub use types::{
    IndexDescription, IndexStatus, PineconeError, RecordMetadata, ScoredRecord, ServerlessSpec,
    UpsertSummary, VectorRecord,
};
