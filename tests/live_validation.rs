use std::{env, sync::Once};

use medchat::{
    classifier::{HttpZeroShotClassifier, ModelChoice, ModelRouter},
    config, embedding,
    llm::build_model_set,
    pinecone::PineconeService,
};
use std::sync::Arc;

static INIT: Once = Once::new();

fn set_default_env(key: &str, value: &str) {
    let needs_value = env::var(key).map(|v| v.trim().is_empty()).unwrap_or(true);
    if needs_value {
        // SAFETY: Tests run serially via Once and we intentionally mutate process env.
        unsafe {
            env::set_var(key, value);
        }
    }
}

fn init_config_once() {
    INIT.call_once(|| {
        set_default_env("PINECONE_INDEX_NAME", "medbase");
        set_default_env("EMBEDDING_PROVIDER", "ollama");
        set_default_env("EMBEDDING_MODEL", "nomic-embed-text");
        set_default_env("EMBEDDING_DIMENSION", "768");
        set_default_env("OLLAMA_URL", "http://127.0.0.1:11434");
        config::init_config();
    });
}

#[tokio::test]
#[ignore = "Requires a live Pinecone project and PINECONE_API_KEY"]
async fn live_pinecone_lists_indexes() {
    init_config_once();
    let service = PineconeService::new(config::get_config()).expect("pinecone client");
    let indexes = service.list_indexes().await.expect("list indexes");
    eprintln!("indexes: {indexes:?}");
}

#[tokio::test]
#[ignore = "Requires live Ollama embeddings"]
async fn live_ollama_embedding_roundtrip() {
    init_config_once();
    let client = embedding::get_embedding_client(config::get_config()).expect("http client");
    let vectors = client
        .generate_embeddings(vec!["medchat live embedding".to_string()])
        .await
        .expect("failed to request embeddings from provider");
    assert_eq!(vectors.len(), 1, "expected embedding per input chunk");
    let dimension = config::get_config().embedding_dimension;
    assert_eq!(vectors[0].len(), dimension, "embedding dimension mismatch");
}

#[tokio::test]
#[ignore = "Requires live Ollama models"]
async fn live_general_model_generates_text() {
    init_config_once();
    let models = build_model_set(config::get_config()).expect("http client");
    let reply = models
        .general
        .generate("Say hello in one word.")
        .await
        .expect("generation");
    assert!(!reply.trim().is_empty());
}

#[tokio::test]
#[ignore = "Requires the zero-shot classification endpoint"]
async fn live_classifier_routes_symptoms_to_medical() {
    init_config_once();
    let classifier =
        HttpZeroShotClassifier::from_config(config::get_config()).expect("http client");
    let router = ModelRouter::new(Arc::new(classifier));
    assert_eq!(
        router.route("I have a headache and fever").await,
        ModelChoice::Medical
    );
}
