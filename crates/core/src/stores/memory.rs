use crate::traits::{check_batch, VectorIndex};
use crate::{SearchCandidate, SearchError, TextChunk};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct MemoryState {
    dimensions: Option<usize>,
    entries: Vec<(TextChunk, Vec<f32>)>,
    /// chunk id -> position in `entries`
    positions: HashMap<String, usize>,
}

impl MemoryState {
    fn upsert(&mut self, chunk: &TextChunk, embedding: &[f32]) {
        let entry = (chunk.clone(), embedding.to_vec());
        match self.positions.get(&chunk.chunk_id) {
            Some(&position) => self.entries[position] = entry,
            None => {
                self.positions
                    .insert(chunk.chunk_id.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }
}

/// Brute-force cosine similarity over vectors held in process.
#[derive(Default)]
pub struct InMemoryVectorStore {
    state: RwLock<MemoryState>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .map(|state| state.entries.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> SearchError {
    SearchError::Request("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl VectorIndex for InMemoryVectorStore {
    async fn reset_collection(&self) -> Result<(), SearchError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        *state = MemoryState::default();
        Ok(())
    }

    async fn ensure_collection(&self, dimensions: usize) -> Result<(), SearchError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        match state.dimensions {
            Some(existing) if existing != dimensions => Err(SearchError::Request(format!(
                "collection has dimension {existing}, requested {dimensions}"
            ))),
            Some(_) => Ok(()),
            None => {
                state.dimensions = Some(dimensions);
                Ok(())
            }
        }
    }

    async fn index_chunks(
        &self,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), SearchError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let dimensions = state
            .dimensions
            .ok_or_else(|| SearchError::NotReady("collection not created".to_string()))?;
        check_batch(chunks, embeddings, dimensions)?;

        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            state.upsert(chunk, embedding);
        }

        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchCandidate>, SearchError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let dimensions = state
            .dimensions
            .ok_or_else(|| SearchError::NotReady("collection not created".to_string()))?;

        if query_vector.len() != dimensions {
            return Err(SearchError::Request(format!(
                "query vector dim {} is not {}",
                query_vector.len(),
                dimensions
            )));
        }

        let mut scored = state
            .entries
            .iter()
            .map(|(chunk, embedding)| (cosine_similarity(query_vector, embedding), chunk))
            .collect::<Vec<_>>();
        scored.sort_by(|left, right| right.0.total_cmp(&left.0));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, chunk)| SearchCandidate {
                chunk_id: chunk.chunk_id.clone(),
                document: chunk.document.clone(),
                page: chunk.page,
                score,
                text: chunk.text.clone(),
                source: "memory".to_string(),
            })
            .collect())
    }
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    let mut dot = 0f64;
    let mut left_norm = 0f64;
    let mut right_norm = 0f64;
    for (a, b) in left.iter().zip(right) {
        let (a, b) = (f64::from(*a), f64::from(*b));
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }

    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm.sqrt() * right_norm.sqrt())
    }
}
