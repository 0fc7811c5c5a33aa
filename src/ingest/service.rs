//! Ingestion service coordinating PDF loading, chunking, embedding, and index writes.

use crate::{
    embedding::EmbeddingClient,
    ingest::{
        chunking::split_documents,
        pdf::load_pdf_files,
        types::{DocumentChunk, IngestError, IngestOutcome},
    },
    metrics::ChatMetrics,
    pinecone::{RecordMetadata, VectorIndex, VectorRecord},
};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Populates the vector index from a folder of PDFs.
///
/// Runs once at startup and again whenever `POST /ingest` is called. Every run generates fresh
/// record ids, so re-ingesting the same folder adds a second copy of each chunk.
pub struct IngestionService {
    embedding_client: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    metrics: Arc<ChatMetrics>,
    chunk_size: usize,
    chunk_overlap: usize,
    batch_size: usize,
}

impl IngestionService {
    /// Build an ingestion service around shared embedding and index handles.
    pub fn new(
        embedding_client: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        metrics: Arc<ChatMetrics>,
        chunk_size: usize,
        chunk_overlap: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            embedding_client,
            index,
            metrics,
            chunk_size,
            chunk_overlap,
            batch_size: batch_size.max(1),
        }
    }

    /// Load, chunk, embed, and upsert every PDF in `folder`.
    pub async fn ingest_folder(&self, folder: &Path) -> Result<IngestOutcome, IngestError> {
        tracing::info!(folder = %folder.display(), "Ingesting PDF folder");
        let documents = load_pdf_files(folder).await?;
        let chunks = split_documents(&documents, self.chunk_size, self.chunk_overlap)?;
        tracing::debug!(
            documents = documents.len(),
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            chunk_overlap = self.chunk_overlap,
            "Documents split"
        );

        let upserted = self.index_chunks(chunks.clone()).await?;
        let outcome = IngestOutcome {
            documents: documents.len(),
            chunks: chunks.len(),
            upserted,
        };

        self.metrics
            .record_ingestion(outcome.documents as u64, outcome.upserted as u64);
        if outcome.upserted == 0 {
            tracing::warn!(
                folder = %folder.display(),
                "Ingestion indexed no chunks; retrieval will return empty context"
            );
        } else {
            tracing::info!(
                documents = outcome.documents,
                chunks = outcome.chunks,
                upserted = outcome.upserted,
                "Ingestion complete"
            );
        }
        Ok(outcome)
    }

    /// Embed and upsert chunks one batch at a time, returning the acknowledged record count.
    pub async fn index_chunks(&self, chunks: Vec<DocumentChunk>) -> Result<usize, IngestError> {
        let mut upserted = 0;
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = self.embedding_client.generate_embeddings(texts).await?;
            debug_assert_eq!(vectors.len(), batch.len());

            let records = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, values)| VectorRecord {
                    id: Uuid::new_v4().to_string(),
                    values,
                    metadata: RecordMetadata {
                        chunk: chunk.sequence_index,
                        source: chunk.source.clone(),
                        page: chunk.page,
                        text: Some(chunk.text.clone()),
                    },
                })
                .collect();

            upserted += self.index.upsert(records).await?.upserted;
        }
        Ok(upserted)
    }
}
