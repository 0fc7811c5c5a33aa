//! Document ingestion: PDF loading, chunking, embedding, and index population.

pub mod chunking;
pub mod pdf;
mod service;
pub mod types;

pub use chunking::{chunk_text, split_documents};
pub use pdf::load_pdf_files;
pub use service::IngestionService;
pub use types::{ChunkingError, DocumentChunk, IngestError, IngestOutcome, SourceDocument};
