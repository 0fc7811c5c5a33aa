use httpmock::{
    Method::{GET, POST},
    MockServer,
};
use medchat::app::{ChatApi, ChatApp};
use medchat::chat::GREETING;
use medchat::config;
use serde_json::json;

fn set_env(key: &str, value: &str) {
    // SAFETY: This binary holds a single test that configures the process before spawning work.
    unsafe { std::env::set_var(key, value) }
}

#[tokio::test]
async fn empty_folder_pipeline_answers_from_medical_model_without_context() {
    let server = MockServer::start_async().await;
    let base_url = server.base_url();
    let pdf_folder = tempfile::tempdir().expect("temp dir");

    let list_indexes = server
        .mock_async(|when, then| {
            when.method(GET).path("/indexes").header("api-key", "test-key");
            then.status(200)
                .json_body(json!({ "indexes": [{ "name": "medbase" }] }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/indexes/medbase");
            then.status(200).json_body(json!({
                "name": "medbase",
                "dimension": 4,
                "metric": "dotproduct",
                "host": &base_url,
                "status": { "ready": true, "state": "Ready" }
            }));
        })
        .await;
    let upsert = server
        .mock_async(|when, then| {
            when.method(POST).path("/vectors/upsert");
            then.status(200).json_body(json!({ "upsertedCount": 0 }));
        })
        .await;
    let query = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/query")
                .json_body_partial(r#"{ "topK": 4, "includeMetadata": true }"#);
            then.status(200).json_body(json!({ "matches": [] }));
        })
        .await;
    let embed = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/embed");
            then.status(200)
                .json_body(json!({ "embeddings": [[0.1, 0.2, 0.3, 0.4]] }));
        })
        .await;
    let classify = server
        .mock_async(|when, then| {
            when.method(POST).path("/classify");
            then.status(200).json_body(json!({
                "labels": ["medical", "general"],
                "scores": [0.93, 0.07]
            }));
        })
        .await;
    let medical = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/generate")
                .json_body_partial(r#"{ "model": "biomistral" }"#)
                .body_contains("User Input: I have a headache and fever");
            then.status(200).json_body(json!({
                "response": "Rest, hydrate, and see a doctor if the fever persists.",
                "done": true
            }));
        })
        .await;
    let general = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/generate")
                .json_body_partial(r#"{ "model": "llama2" }"#);
            then.status(200)
                .json_body(json!({ "response": "unexpected", "done": true }));
        })
        .await;

    set_env("PINECONE_API_KEY", "test-key");
    set_env("PINECONE_CONTROL_URL", &base_url);
    set_env("PDF_FOLDER", &pdf_folder.path().display().to_string());
    set_env("EMBEDDING_PROVIDER", "ollama");
    set_env("EMBEDDING_MODEL", "nomic-embed-text");
    set_env("EMBEDDING_DIMENSION", "4");
    set_env("OLLAMA_URL", &base_url);
    set_env("MEDICAL_MODEL", "biomistral");
    set_env("GENERAL_MODEL", "llama2");
    set_env("CLASSIFIER_URL", &format!("{base_url}/classify"));
    set_env("MEMORY_KIND", "timestamped");
    set_env("OLLAMA_PULL_MODELS", "false");
    config::init_config();

    let app = ChatApp::new().await;
    list_indexes.assert_async().await;
    assert_eq!(upsert.hits_async().await, 0);
    assert_eq!(app.metrics_snapshot().chunks_indexed, 0);

    let transcript = app.chat("patient", "I have a headache and fever").await;
    assert_eq!(
        transcript.last().map(|(_, bot)| bot.as_str()),
        Some("Rest, hydrate, and see a doctor if the fever persists.")
    );
    classify.assert_async().await;
    embed.assert_async().await;
    query.assert_async().await;
    medical.assert_async().await;
    assert_eq!(general.hits_async().await, 0);

    let snapshot = app.session("patient").await.expect("session exists");
    assert_eq!(
        snapshot.history,
        "I have a headache and fever\nRest, hydrate, and see a doctor if the fever persists."
    );

    let transcript = app.chat("patient", "").await;
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[1].1, GREETING);
    assert_eq!(app.session_ids(), ["patient"]);

    let metrics = app.metrics_snapshot();
    assert_eq!(metrics.turns_answered, 1);
    assert_eq!(metrics.medical_routes, 1);
}
