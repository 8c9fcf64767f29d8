use crate::SearchError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::future::Future;
use tracing::debug;

const DEFAULT: usize = 128;

/// Instances per `:predict` call accepted by the gecko embedding models.
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 5;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

#[async_trait]
pub trait Embedder {
    fn dimensions(&self) -> usize;

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| SearchError::BackendResponse {
            backend: "embedder".to_string(),
            details: "no embedding returned for query".to_string(),
        })
    }
}

#[async_trait]
impl<T> Embedder for Box<T>
where
    T: Embedder + ?Sized + Send + Sync,
{
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        (**self).embed_documents(texts).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        (**self).embed_query(text).await
    }
}

/// Offline embedder: hashed character tri-grams, L2-normalized.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub model_name: String,
    pub project: String,
    pub location: String,
    pub access_token: Option<String>,
    pub dimensions: usize,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_name: "textembedding-gecko@003".to_string(),
            project: String::new(),
            location: "us-central1".to_string(),
            access_token: None,
            dimensions: 768,
            batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
        }
    }
}

impl EmbeddingConfig {
    pub fn predict_url(&self) -> String {
        format!(
            "https://{location}-aiplatform.googleapis.com/v1/projects/{project}/locations/{location}/publishers/google/models/{model}:predict",
            location = self.location,
            project = self.project,
            model = self.model_name,
        )
    }
}

/// Vertex AI text embedding model behind its REST `:predict` endpoint.
pub struct VertexEmbeddingClient {
    config: EmbeddingConfig,
    endpoint: String,
    client: Client,
}

impl VertexEmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> Result<Self, SearchError> {
        if config.project.trim().is_empty() {
            return Err(SearchError::Request(
                "vertex embedding requires a project id".to_string(),
            ));
        }

        let endpoint = url::Url::parse(&config.predict_url())?.to_string();
        Ok(Self {
            config,
            endpoint,
            client: Client::new(),
        })
    }

    /// Points the client at a different predict URL, e.g. a regional proxy.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn predict(&self, batch: Vec<String>) -> Result<Value, SearchError> {
        let instances = batch
            .iter()
            .map(|text| json!({ "content": text }))
            .collect::<Vec<_>>();

        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "instances": instances }));
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        SearchError::ensure_success("vertex", response.status())?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Embedder for VertexEmbeddingClient {
    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        embed_in_batches(texts, self.config.batch_size, |batch| self.predict(batch)).await
    }
}

/// Sends `texts` in consecutive batches and concatenates the predictions in
/// input order. Each response must hold one embedding per text sent.
async fn embed_in_batches<F, Fut>(
    texts: &[String],
    batch_size: usize,
    mut send: F,
) -> Result<Vec<Vec<f32>>, SearchError>
where
    F: FnMut(Vec<String>) -> Fut,
    Fut: Future<Output = Result<Value, SearchError>>,
{
    let mut vectors = Vec::with_capacity(texts.len());
    for (batch_no, batch) in texts.chunks(batch_size.max(1)).enumerate() {
        let payload = send(batch.to_vec()).await?;
        let predicted = parse_predictions(&payload)?;

        if predicted.len() != batch.len() {
            return Err(SearchError::BackendResponse {
                backend: "vertex".to_string(),
                details: format!(
                    "batch {batch_no}: expected {} embeddings, got {}",
                    batch.len(),
                    predicted.len()
                ),
            });
        }

        debug!(batch_no, size = batch.len(), "embedding batch done");
        vectors.extend(predicted);
    }

    Ok(vectors)
}

fn parse_predictions(payload: &Value) -> Result<Vec<Vec<f32>>, SearchError> {
    let predictions = payload
        .pointer("/predictions")
        .and_then(Value::as_array)
        .ok_or_else(|| SearchError::BackendResponse {
            backend: "vertex".to_string(),
            details: "response has no predictions".to_string(),
        })?;

    predictions
        .iter()
        .map(|prediction| {
            prediction
                .pointer("/embeddings/values")
                .and_then(Value::as_array)
                .map(|values| {
                    values
                        .iter()
                        .filter_map(Value::as_f64)
                        .map(|value| value as f32)
                        .collect::<Vec<_>>()
                })
                .ok_or_else(|| SearchError::BackendResponse {
                    backend: "vertex".to_string(),
                    details: "prediction has no embedding values".to_string(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("Photosynthesis in plant cells");
        let second = embedder.embed("Photosynthesis in plant cells");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed("abc");
        assert_eq!(vector.len(), 32);
    }

    #[tokio::test]
    async fn query_embedding_matches_document_embedding() -> Result<(), SearchError> {
        let embedder = CharacterNgramEmbedder::default();
        let documents = embedder
            .embed_documents(&["cell biology".to_string()])
            .await?;
        let query = embedder.embed_query("cell biology").await?;
        assert_eq!(documents[0], query);
        Ok(())
    }

    #[test]
    fn predict_url_uses_region_project_and_model() {
        let config = EmbeddingConfig {
            project: "demo-project".to_string(),
            location: "europe-west4".to_string(),
            ..EmbeddingConfig::default()
        };
        assert_eq!(
            config.predict_url(),
            "https://europe-west4-aiplatform.googleapis.com/v1/projects/demo-project/locations/europe-west4/publishers/google/models/textembedding-gecko@003:predict"
        );
    }

    #[test]
    fn vertex_client_requires_project() {
        assert!(VertexEmbeddingClient::new(EmbeddingConfig::default()).is_err());
    }

    #[test]
    fn predictions_are_parsed_in_order() -> Result<(), SearchError> {
        let payload = json!({
            "predictions": [
                {"embeddings": {"values": [0.5, 0.25], "statistics": {"token_count": 2}}},
                {"embeddings": {"values": [1.0, 0.0]}}
            ]
        });
        let vectors = parse_predictions(&payload)?;
        assert_eq!(vectors, vec![vec![0.5, 0.25], vec![1.0, 0.0]]);
        Ok(())
    }

    fn echo_predictions(batch: &[String]) -> Value {
        let predictions = batch
            .iter()
            .map(|text| {
                let id = text.trim_start_matches("text-").parse::<f64>().unwrap_or(-1.0);
                json!({ "embeddings": { "values": [id] } })
            })
            .collect::<Vec<_>>();
        json!({ "predictions": predictions })
    }

    #[tokio::test]
    async fn batches_are_split_and_results_keep_input_order() -> Result<(), SearchError> {
        let texts = (0..12).map(|n| format!("text-{n}")).collect::<Vec<_>>();
        let mut sizes = Vec::new();

        let vectors = embed_in_batches(&texts, 5, |batch| {
            sizes.push(batch.len());
            let payload = echo_predictions(&batch);
            async move { Ok(payload) }
        })
        .await?;

        assert_eq!(sizes, vec![5, 5, 2]);
        let ids = vectors.iter().map(|vector| vector[0]).collect::<Vec<_>>();
        assert_eq!(ids, (0..12).map(|n| n as f32).collect::<Vec<_>>());
        Ok(())
    }

    #[tokio::test]
    async fn zero_batch_size_sends_one_text_at_a_time() -> Result<(), SearchError> {
        let texts = vec!["text-1".to_string(), "text-2".to_string()];
        let mut calls = 0;
        let vectors = embed_in_batches(&texts, 0, |batch| {
            calls += 1;
            let payload = echo_predictions(&batch);
            async move { Ok(payload) }
        })
        .await?;

        assert_eq!(calls, 2);
        assert_eq!(vectors, vec![vec![1.0], vec![2.0]]);
        Ok(())
    }

    #[tokio::test]
    async fn short_batch_response_is_a_count_mismatch() {
        let texts = (0..3).map(|n| format!("text-{n}")).collect::<Vec<_>>();
        let result = embed_in_batches(&texts, 3, |_batch| async {
            Ok(json!({ "predictions": [{ "embeddings": { "values": [0.1] } }] }))
        })
        .await;

        match result {
            Err(SearchError::BackendResponse { backend, details }) => {
                assert_eq!(backend, "vertex");
                assert!(details.contains("expected 3 embeddings, got 1"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_input_sends_nothing() -> Result<(), SearchError> {
        let mut calls = 0;
        let vectors = embed_in_batches(&[], 5, |_batch| {
            calls += 1;
            async { Ok(json!({ "predictions": [] })) }
        })
        .await?;
        assert!(vectors.is_empty());
        assert_eq!(calls, 0);
        Ok(())
    }

    #[test]
    fn missing_predictions_is_a_backend_error() {
        let payload = json!({ "error": "quota" });
        assert!(matches!(
            parse_predictions(&payload),
            Err(SearchError::BackendResponse { .. })
        ));
    }
}
