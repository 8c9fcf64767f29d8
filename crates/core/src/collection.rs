use crate::chunking::{build_chunks, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::traits::VectorIndex;
use crate::{PageText, RetrievedContext, SearchError};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
pub struct CollectionOptions {
    pub chunking: ChunkingConfig,
    pub top_k: usize,
    /// Candidates scoring below this are treated as not found.
    pub min_relevance: Option<f64>,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            top_k: 4,
            min_relevance: None,
        }
    }
}

/// Vector collection over ingested pages, queried by quiz topic.
pub struct TopicCollection<E, V> {
    embedder: E,
    index: V,
    options: CollectionOptions,
    ready: AtomicBool,
}

impl<E, V> TopicCollection<E, V>
where
    E: Embedder + Send + Sync,
    V: VectorIndex + Send + Sync,
{
    pub fn new(embedder: E, index: V) -> Self {
        Self::with_options(embedder, index, CollectionOptions::default())
    }

    pub fn with_options(embedder: E, index: V, options: CollectionOptions) -> Self {
        Self {
            embedder,
            index,
            options,
            ready: AtomicBool::new(false),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub async fn create_collection(&self, pages: &[PageText]) -> Result<usize, SearchError> {
        if pages.is_empty() {
            return Err(SearchError::Request(
                "no pages to index, ingest documents first".to_string(),
            ));
        }

        let chunks = build_chunks(pages, self.options.chunking)
            .map_err(|error| SearchError::Request(error.to_string()))?;
        let texts = chunks
            .iter()
            .map(|chunk| chunk.text.clone())
            .collect::<Vec<_>>();
        let embeddings = self.embedder.embed_documents(&texts).await?;

        self.ready.store(false, Ordering::Release);
        self.index.reset_collection().await?;
        self.index
            .ensure_collection(self.embedder.dimensions())
            .await?;
        self.index.index_chunks(&chunks, &embeddings).await?;
        self.ready.store(true, Ordering::Release);

        info!(
            pages = pages.len(),
            chunks = chunks.len(),
            "collection created"
        );
        Ok(chunks.len())
    }

    /// `Ok(None)` means the collection exists but nothing matched the topic.
    pub async fn query_topic(&self, topic: &str) -> Result<Option<RetrievedContext>, SearchError> {
        if !self.is_ready() {
            return Err(SearchError::NotReady(
                "collection has not been created".to_string(),
            ));
        }

        if topic.trim().is_empty() {
            return Err(SearchError::Request("query is empty".to_string()));
        }

        let query_vector = self.embedder.embed_query(topic).await?;
        let mut candidates = self.index.search(&query_vector, self.options.top_k).await?;

        if let Some(threshold) = self.options.min_relevance {
            candidates.retain(|candidate| candidate.score >= threshold);
        }

        debug!(topic, hits = candidates.len(), "topic query finished");
        Ok(RetrievedContext::new(topic, candidates))
    }
}
