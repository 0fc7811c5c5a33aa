#![deny(missing_docs)]

//! Core library for the medchat retrieval-augmented chatbot.

/// HTTP routing and REST handlers.
pub mod api;
/// Application wiring shared by the server and the CLI.
pub mod app;
/// Per-turn response orchestration.
pub mod chat;
/// Zero-shot classification and model routing.
pub mod classifier;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// PDF loading, chunking, and index population.
pub mod ingest;
/// Language model abstraction and the Ollama adapter.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Per-session conversation memory.
pub mod memory;
/// Ingestion and chat counters.
pub mod metrics;
/// Pinecone vector database integration.
pub mod pinecone;
/// Query-time context retrieval.
pub mod retrieval;
