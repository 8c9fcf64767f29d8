use crate::{SearchCandidate, SearchError, TextChunk};
use async_trait::async_trait;

#[async_trait]
pub trait VectorIndex {
    /// Drops every stored chunk so the next build starts from nothing.
    async fn reset_collection(&self) -> Result<(), SearchError>;

    async fn ensure_collection(&self, dimensions: usize) -> Result<(), SearchError>;

    async fn index_chunks(
        &self,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), SearchError>;

    /// Nearest chunks to `query_vector`, most relevant first.
    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchCandidate>, SearchError>;
}

#[async_trait]
impl<T> VectorIndex for Box<T>
where
    T: VectorIndex + ?Sized + Send + Sync,
{
    async fn reset_collection(&self) -> Result<(), SearchError> {
        (**self).reset_collection().await
    }

    async fn ensure_collection(&self, dimensions: usize) -> Result<(), SearchError> {
        (**self).ensure_collection(dimensions).await
    }

    async fn index_chunks(
        &self,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), SearchError> {
        (**self).index_chunks(chunks, embeddings).await
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchCandidate>, SearchError> {
        (**self).search(query_vector, top_k).await
    }
}

pub(crate) fn check_batch(
    chunks: &[TextChunk],
    embeddings: &[Vec<f32>],
    dimensions: usize,
) -> Result<(), SearchError> {
    if chunks.len() != embeddings.len() {
        return Err(SearchError::Request(format!(
            "embedding count {} doesn't match chunk count {}",
            embeddings.len(),
            chunks.len()
        )));
    }

    if let Some(bad) = embeddings.iter().find(|vector| vector.len() != dimensions) {
        return Err(SearchError::Request(format!(
            "embedding dimension {} != {}",
            bad.len(),
            dimensions
        )));
    }

    Ok(())
}
