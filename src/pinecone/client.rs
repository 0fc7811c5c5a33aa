//! HTTP clients for the Pinecone control plane and per-index data plane.

use crate::config::{Config, Metric};
use crate::pinecone::types::{
    IndexDescription, ListIndexesResponse, PineconeError, QueryResponse, ScoredRecord,
    ServerlessSpec, UpsertResponse, UpsertSummary, VectorRecord,
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::json;
use std::cmp::Ordering;
use std::time::Duration;

const API_VERSION: &str = "2024-07";

/// Data-plane operations the ingestion and retrieval layers depend on.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace records by id.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<UpsertSummary, PineconeError>;

    /// Return the `top_k` nearest records, best first.
    async fn query(
        &self,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>, PineconeError>;
}

/// Control-plane client: lists, describes, and creates indexes.
pub struct PineconeService {
    pub(crate) client: Client,
    pub(crate) control_url: String,
    pub(crate) api_key: String,
    pub(crate) poll_interval: Duration,
    pub(crate) batch_size: usize,
}

/// Data-plane handle bound to a single index host.
pub struct IndexHandle {
    client: Client,
    name: String,
    host_url: String,
    api_key: String,
    batch_size: usize,
}

impl PineconeService {
    /// Construct a client from the loaded configuration.
    pub fn new(config: &Config) -> Result<Self, PineconeError> {
        let client = config.http_client("medchat/0.1")?;
        let control_url =
            normalize_base_url(&config.pinecone_control_url).map_err(PineconeError::InvalidUrl)?;
        tracing::debug!(
            url = %control_url,
            has_api_key = !config.pinecone_api_key.is_empty(),
            "Initialized Pinecone HTTP client"
        );

        Ok(Self {
            client,
            control_url,
            api_key: config.pinecone_api_key.clone(),
            poll_interval: config.index_poll_interval,
            batch_size: config.upsert_batch_size.max(1),
        })
    }

    /// Names of all indexes in the project.
    pub async fn list_indexes(&self) -> Result<Vec<String>, PineconeError> {
        let response = self.request(Method::GET, "indexes").send().await?;
        let response = ensure_success(response, "list indexes").await?;
        let payload: ListIndexesResponse = response.json().await?;
        Ok(payload.indexes.into_iter().map(|index| index.name).collect())
    }

    /// Fetch the description (host and readiness) of `name`.
    pub async fn describe_index(&self, name: &str) -> Result<IndexDescription, PineconeError> {
        let response = self
            .request(Method::GET, &format!("indexes/{name}"))
            .send()
            .await?;
        let response = ensure_success(response, "describe index").await?;
        Ok(response.json().await?)
    }

    /// Request creation of a serverless index. Returns before the index is ready.
    pub async fn create_index(
        &self,
        name: &str,
        dimension: usize,
        metric: Metric,
        spec: &ServerlessSpec,
    ) -> Result<(), PineconeError> {
        let body = json!({
            "name": name,
            "dimension": dimension,
            "metric": metric.as_str(),
            "spec": { "serverless": spec },
        });

        let response = self.request(Method::POST, "indexes").json(&body).send().await?;
        ensure_success(response, "create index").await?;
        tracing::info!(
            index = name,
            dimension,
            metric = metric.as_str(),
            "Index creation requested"
        );
        Ok(())
    }

    /// Return a handle to `name`, creating the index and waiting for readiness when missing.
    ///
    /// An existing index is returned untouched. A new index is polled every `poll_interval`
    /// until it reports ready; the wait has no upper bound.
    pub async fn ensure_index(
        &self,
        name: &str,
        dimension: usize,
        metric: Metric,
        spec: &ServerlessSpec,
    ) -> Result<IndexHandle, PineconeError> {
        let existing = self.list_indexes().await?;
        if !existing.iter().any(|index| index == name) {
            self.create_index(name, dimension, metric, spec).await?;
            loop {
                let description = self.describe_index(name).await?;
                if description.status.ready {
                    break;
                }
                tracing::debug!(
                    index = name,
                    state = ?description.status.state,
                    "Waiting for index readiness"
                );
                tokio::time::sleep(self.poll_interval).await;
            }
            tracing::info!(index = name, "Index ready");
        } else {
            tracing::debug!(index = name, "Index already exists");
        }

        self.index(name).await
    }

    /// Resolve the data-plane host of an existing index.
    pub async fn index(&self, name: &str) -> Result<IndexHandle, PineconeError> {
        let description = self.describe_index(name).await?;
        let host = description
            .host
            .filter(|host| !host.trim().is_empty())
            .ok_or_else(|| PineconeError::MissingHost(name.to_string()))?;
        let host_url = if host.contains("://") {
            normalize_base_url(&host)
        } else {
            normalize_base_url(&format!("https://{host}"))
        }
        .map_err(PineconeError::InvalidUrl)?;

        Ok(IndexHandle {
            client: self.client.clone(),
            name: name.to_string(),
            host_url,
            api_key: self.api_key.clone(),
            batch_size: self.batch_size,
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        authorize(
            self.client.request(method, format_endpoint(&self.control_url, path)),
            &self.api_key,
        )
    }
}

impl IndexHandle {
    /// Name of the index this handle writes to.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        authorize(
            self.client
                .request(Method::POST, format_endpoint(&self.host_url, path)),
            &self.api_key,
        )
    }
}

#[async_trait]
impl VectorIndex for IndexHandle {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<UpsertSummary, PineconeError> {
        let mut summary = UpsertSummary::default();

        for (batch, chunk) in records.chunks(self.batch_size).enumerate() {
            let send = async {
                let response = self
                    .request("vectors/upsert")
                    .json(&json!({ "vectors": chunk }))
                    .send()
                    .await?;
                let response = ensure_success(response, "upsert").await?;
                let body: UpsertResponse = response.json().await?;
                Ok::<usize, PineconeError>(body.upserted_count.unwrap_or(chunk.len()))
            };

            let upserted = send.await.map_err(|source| PineconeError::BatchFailed {
                batch,
                source: Box::new(source),
            })?;
            summary.upserted += upserted;
            summary.batches += 1;
            tracing::debug!(index = %self.name, batch, upserted, "Upsert batch written");
        }

        Ok(summary)
    }

    async fn query(
        &self,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>, PineconeError> {
        let body = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "includeValues": false,
        });

        let response = self.request("query").json(&body).send().await?;
        let response = ensure_success(response, "query").await?;
        let QueryResponse { mut matches } = response.json().await?;
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        Ok(matches)
    }
}

fn authorize(request: reqwest::RequestBuilder, api_key: &str) -> reqwest::RequestBuilder {
    let request = request.header("X-Pinecone-API-Version", API_VERSION);
    if api_key.is_empty() {
        request
    } else {
        request.header("Api-Key", api_key)
    }
}

async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, PineconeError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let error = PineconeError::UnexpectedStatus { status, body };
    if status == StatusCode::NOT_FOUND {
        tracing::debug!(operation, error = %error, "Pinecone resource not found");
    } else {
        tracing::error!(operation, error = %error, "Pinecone request failed");
    }
    Err(error)
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
