//! In-memory [`VectorStore`] for tests and throwaway sessions.
//!
//! Chunks live in a `Vec` behind a `tokio::sync::RwLock`; search is
//! brute-force cosine similarity over everything stored.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::embedding::cosine_similarity;
use crate::models::{SearchResult, StoryChunk};

use super::{ensure_embedded, rank, stored_copy, VectorStore};

#[derive(Default)]
pub struct InMemoryVectorStore {
    chunks: RwLock<Vec<StoryChunk>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn add_chunks(&self, chunks: &[StoryChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        ensure_embedded(chunks)?;

        let mut stored = self.chunks.write().await;
        for chunk in chunks {
            stored.retain(|c| c.id != chunk.id);
            stored.push(stored_copy(chunk));
        }
        Ok(())
    }

    async fn search_similar(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        if query_embedding.is_empty() {
            return Ok(Vec::new());
        }
        let stored = self.chunks.read().await;
        let scored = stored
            .iter()
            .filter_map(|c| {
                let embedding = c.embedding.as_deref()?;
                let sim = cosine_similarity(query_embedding, embedding) as f64;
                Some((c.clone(), sim))
            })
            .collect();
        Ok(rank(scored, top_k))
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<StoryChunk>> {
        let stored = self.chunks.read().await;
        Ok(stored.iter().find(|c| c.id == chunk_id).cloned())
    }

    async fn clear_all(&self) -> Result<()> {
        self.chunks.write().await.clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.chunks.read().await.len())
    }
}
