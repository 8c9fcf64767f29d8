use crate::traits::{check_batch, VectorIndex};
use crate::{SearchCandidate, SearchError, TextChunk};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

const BACKEND: &str = "chroma";

pub struct ChromaStore {
    base: Url,
    collection: String,
    client: Client,
    vector_size: usize,
    collection_id: RwLock<Option<String>>,
}

impl ChromaStore {
    pub fn new(
        endpoint: &str,
        collection: impl Into<String>,
        vector_size: usize,
    ) -> Result<Self, SearchError> {
        let mut base = Url::parse(endpoint)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            base,
            collection: collection.into(),
            client: Client::new(),
            vector_size,
            collection_id: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> Result<Url, SearchError> {
        Ok(self.base.join(path)?)
    }

    async fn collection_id(&self) -> Result<String, SearchError> {
        if let Some(id) = self.collection_id.read().await.as_ref() {
            return Ok(id.clone());
        }

        let mut cached = self.collection_id.write().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let response = self
            .client
            .post(self.url("api/v1/collections")?)
            .json(&create_collection_body(&self.collection))
            .send()
            .await?;
        SearchError::ensure_success(BACKEND, response.status())?;

        let parsed: Value = response.json().await?;
        let id = parse_collection_id(&parsed)?;
        debug!(collection = %self.collection, %id, "chroma collection ready");
        *cached = Some(id.clone());
        Ok(id)
    }

    async fn ready_id(&self) -> Result<String, SearchError> {
        self.collection_id
            .read()
            .await
            .clone()
            .ok_or_else(|| SearchError::NotReady("chroma collection not created".to_string()))
    }
}

#[async_trait]
impl VectorIndex for ChromaStore {
    async fn reset_collection(&self) -> Result<(), SearchError> {
        let mut cached = self.collection_id.write().await;
        let response = self
            .client
            .delete(self.url(&format!("api/v1/collections/{}", self.collection))?)
            .send()
            .await?;
        reset_outcome(response.status())?;

        *cached = None;
        debug!(collection = %self.collection, "chroma collection dropped");
        Ok(())
    }

    async fn ensure_collection(&self, dimensions: usize) -> Result<(), SearchError> {
        if self.vector_size != dimensions {
            return Err(SearchError::Request(format!(
                "configured vector size {} does not match requested {}",
                self.vector_size, dimensions
            )));
        }

        self.collection_id().await.map(|_| ())
    }

    async fn index_chunks(
        &self,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), SearchError> {
        check_batch(chunks, embeddings, self.vector_size)?;
        if chunks.is_empty() {
            return Ok(());
        }

        let id = self.ready_id().await?;
        let response = self
            .client
            .post(self.url(&format!("api/v1/collections/{id}/upsert"))?)
            .json(&upsert_body(chunks, embeddings))
            .send()
            .await?;
        SearchError::ensure_success(BACKEND, response.status())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchCandidate>, SearchError> {
        if query_vector.len() != self.vector_size {
            return Err(SearchError::Request(format!(
                "query vector dim {} is not {}",
                query_vector.len(),
                self.vector_size
            )));
        }

        let id = self.ready_id().await?;
        let response = self
            .client
            .post(self.url(&format!("api/v1/collections/{id}/query"))?)
            .json(&query_body(query_vector, top_k))
            .send()
            .await?;
        SearchError::ensure_success(BACKEND, response.status())?;

        let parsed: Value = response.json().await?;
        Ok(parse_query_response(&parsed))
    }
}

fn create_collection_body(name: &str) -> Value {
    json!({
        "name": name,
        "get_or_create": true,
        "metadata": { "hnsw:space": "cosine" },
    })
}

fn parse_collection_id(parsed: &Value) -> Result<String, SearchError> {
    parsed
        .pointer("/id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SearchError::BackendResponse {
            backend: BACKEND.to_string(),
            details: "collection response has no id".to_string(),
        })
}

/// A missing collection is a client error and leaves nothing to drop.
fn reset_outcome(status: StatusCode) -> Result<(), SearchError> {
    if status.is_client_error() {
        return Ok(());
    }
    SearchError::ensure_success(BACKEND, status)
}

fn upsert_body(chunks: &[TextChunk], embeddings: &[Vec<f32>]) -> Value {
    let ids = chunks.iter().map(|chunk| &chunk.chunk_id).collect::<Vec<_>>();
    let documents = chunks.iter().map(|chunk| &chunk.text).collect::<Vec<_>>();
    let metadatas = chunks
        .iter()
        .map(|chunk| {
            json!({
                "document": chunk.document,
                "page": chunk.page,
                "chunk_index": chunk.chunk_index,
            })
        })
        .collect::<Vec<_>>();

    json!({
        "ids": ids,
        "embeddings": embeddings,
        "documents": documents,
        "metadatas": metadatas,
    })
}

fn query_body(query_vector: &[f32], top_k: usize) -> Value {
    json!({
        "query_embeddings": [query_vector],
        "n_results": top_k,
        "include": ["documents", "metadatas", "distances"],
    })
}

/// Chroma answers with one list per query embedding; only the first is used.
fn parse_query_response(parsed: &Value) -> Vec<SearchCandidate> {
    let column = |name: &str| {
        parsed
            .pointer(&format!("/{name}/0"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    };

    let ids = column("ids");
    let documents = column("documents");
    let metadatas = column("metadatas");
    let distances = column("distances");

    ids.iter()
        .enumerate()
        .map(|(position, id)| {
            let metadata = metadatas.get(position);
            let distance = distances
                .get(position)
                .and_then(Value::as_f64)
                .unwrap_or(f64::INFINITY);

            SearchCandidate {
                chunk_id: id.as_str().unwrap_or_default().to_string(),
                document: metadata
                    .and_then(|value| value.pointer("/document"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                page: metadata
                    .and_then(|value| value.pointer("/page"))
                    .and_then(Value::as_u64)
                    .and_then(|page| u32::try_from(page).ok())
                    .unwrap_or_default(),
                score: 1.0 / (1.0 + distance.max(0.0)),
                text: documents
                    .get(position)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                source: "chroma".to_string(),
            }
        })
        .collect()
}
