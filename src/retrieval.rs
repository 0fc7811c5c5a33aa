//! Query-time retrieval: embed the question, search the index, return chunk texts.

use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::pinecone::{PineconeError, VectorIndex};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors emitted while fetching supporting context.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Embedding provider failed to return a vector for the query.
    #[error("Failed to embed query: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Index query failed.
    #[error("Vector index query failed: {0}")]
    Index(#[from] PineconeError),
    /// Embedding provider returned no vectors.
    #[error("Embedding provider returned no vector for the query")]
    EmptyEmbedding,
}

/// Source of supporting passages for a user turn.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Return passages relevant to `query_text`, most relevant first.
    async fn retrieve(&self, query_text: &str) -> Result<Vec<String>, RetrievalError>;
}

/// Retriever backed by the embedding client and the vector index.
pub struct Retriever {
    embedding_client: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
}

impl Retriever {
    /// Build a retriever returning at most `top_k` passages per query.
    pub fn new(
        embedding_client: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        top_k: usize,
    ) -> Self {
        Self {
            embedding_client,
            index,
            top_k: top_k.max(1),
        }
    }
}

#[async_trait]
impl ContextRetriever for Retriever {
    async fn retrieve(&self, query_text: &str) -> Result<Vec<String>, RetrievalError> {
        let vector = self
            .embedding_client
            .generate_embeddings(vec![query_text.to_string()])
            .await?
            .pop()
            .ok_or(RetrievalError::EmptyEmbedding)?;

        let matches = self.index.query(vector, self.top_k).await?;
        let total = matches.len();
        let passages: Vec<String> = matches
            .into_iter()
            .filter_map(|record| record.metadata.and_then(|metadata| metadata.text))
            .collect();

        tracing::debug!(
            matches = total,
            passages = passages.len(),
            top_k = self.top_k,
            "Retrieved context"
        );
        Ok(passages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbeddingClient;
    use crate::pinecone::{RecordMetadata, ScoredRecord, UpsertSummary, VectorRecord};
    use std::sync::Mutex;

    struct FixedIndex {
        matches: Vec<ScoredRecord>,
        requested_top_k: Mutex<Option<usize>>,
    }

    #[async_trait]
    impl VectorIndex for FixedIndex {
        async fn upsert(
            &self,
            _records: Vec<VectorRecord>,
        ) -> Result<UpsertSummary, PineconeError> {
            Ok(UpsertSummary::default())
        }

        async fn query(
            &self,
            _vector: Vec<f32>,
            top_k: usize,
        ) -> Result<Vec<ScoredRecord>, PineconeError> {
            *self.requested_top_k.lock().unwrap() = Some(top_k);
            Ok(self.matches.clone())
        }
    }

    fn scored(id: &str, score: f32, text: Option<&str>) -> ScoredRecord {
        ScoredRecord {
            id: id.into(),
            score,
            metadata: Some(RecordMetadata {
                chunk: 0,
                source: "a.pdf".into(),
                page: 1,
                text: text.map(str::to_string),
            }),
        }
    }

    fn retriever(matches: Vec<ScoredRecord>) -> (Retriever, Arc<FixedIndex>) {
        let index = Arc::new(FixedIndex {
            matches,
            requested_top_k: Mutex::new(None),
        });
        let retriever = Retriever::new(Arc::new(HashingEmbeddingClient::new(8)), index.clone(), 3);
        (retriever, index)
    }

    #[tokio::test]
    async fn returns_texts_in_index_order() {
        let (retriever, index) = retriever(vec![
            scored("a", 0.9, Some("Drink fluids.")),
            scored("b", 0.7, Some("Rest.")),
            scored("c", 0.7, Some("Drink fluids.")),
        ]);

        let passages = retriever.retrieve("fever").await.expect("passages");

        assert_eq!(passages, ["Drink fluids.", "Rest.", "Drink fluids."]);
        assert_eq!(*index.requested_top_k.lock().unwrap(), Some(3));
    }

    #[tokio::test]
    async fn skips_matches_without_text() {
        let (retriever, _) = retriever(vec![
            scored("a", 0.9, None),
            ScoredRecord {
                id: "b".into(),
                score: 0.5,
                metadata: None,
            },
            scored("c", 0.1, Some("Only text.")),
        ]);

        let passages = retriever.retrieve("fever").await.expect("passages");
        assert_eq!(passages, ["Only text."]);
    }

    #[tokio::test]
    async fn empty_index_yields_empty_context() {
        let (retriever, _) = retriever(Vec::new());
        assert!(retriever.retrieve("fever").await.expect("passages").is_empty());
    }
}
