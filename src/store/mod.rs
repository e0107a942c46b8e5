//! Vector storage for story chunks.
//!
//! The [`VectorStore`] trait is the seam between the use cases and the
//! concrete backends:
//!
//! | Backend | Type | Notes |
//! |---------|------|-------|
//! | `sqlite` | [`SqliteVectorStore`] | Local file, brute-force cosine search |
//! | `chroma` | [`ChromaVectorStore`] | Remote Chroma server over its REST API |
//! | `memory` | [`InMemoryVectorStore`] | Process-local, for tests and demos |
//!
//! Scores are always `1 - distance`, so higher means more relevant, and
//! ranks are 1-based.

pub mod chroma;
pub mod memory;
pub mod sqlite;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::VectorStoreConfig;
use crate::models::{SearchResult, StoryChunk};

pub use chroma::ChromaVectorStore;
pub use memory::InMemoryVectorStore;
pub use sqlite::SqliteVectorStore;

/// Storage backend for embedded story chunks.
///
/// Implementations must be `Send + Sync` so a single instance can be shared
/// across request handlers.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name (`"sqlite"`, `"chroma"`, `"memory"`).
    fn backend(&self) -> &'static str;

    /// Whether operations go over the network. Health checks skip remote
    /// stores.
    fn is_remote(&self) -> bool {
        false
    }

    /// Persist chunks. Every chunk must carry a non-empty embedding.
    /// An empty slice is a no-op.
    async fn add_chunks(&self, chunks: &[StoryChunk]) -> Result<()>;

    /// Return up to `top_k` chunks closest to `query_embedding`, best first.
    async fn search_similar(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>>;

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<StoryChunk>>;

    /// Remove every chunk. Succeeds when there is nothing to remove.
    async fn clear_all(&self) -> Result<()>;

    async fn count(&self) -> Result<usize>;
}

/// Open the backend selected by `config.backend`.
pub async fn create_store(config: &VectorStoreConfig) -> Result<Arc<dyn VectorStore>> {
    match config.backend.as_str() {
        "sqlite" => Ok(Arc::new(
            SqliteVectorStore::open(&config.path, &config.collection).await?,
        )),
        "chroma" => Ok(Arc::new(ChromaVectorStore::new(
            &config.url,
            &config.collection,
        )?)),
        "memory" => Ok(Arc::new(InMemoryVectorStore::new())),
        other => bail!("Unknown vector store backend: {}", other),
    }
}

/// Reject chunks that cannot be indexed.
pub(crate) fn ensure_embedded(chunks: &[StoryChunk]) -> Result<()> {
    for chunk in chunks {
        match &chunk.embedding {
            Some(e) if !e.is_empty() => {}
            _ => bail!(
                "Chunk {} must have an embedding before adding to vector store",
                chunk.id
            ),
        }
    }
    Ok(())
}

/// Copy of `chunk` with `metadata.chunk_id` filled in, as stored.
pub(crate) fn stored_copy(chunk: &StoryChunk) -> StoryChunk {
    let mut stored = chunk.clone();
    stored.metadata.chunk_id = Some(chunk.id.clone());
    stored
}

/// Sort scored chunks best-first, keep `top_k`, and assign ranks.
pub(crate) fn rank(mut scored: Vec<(StoryChunk, f64)>, top_k: usize) -> Vec<SearchResult> {
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
        .into_iter()
        .take(top_k)
        .enumerate()
        .map(|(i, (chunk, score))| SearchResult {
            chunk,
            score,
            rank: i + 1,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn chunk(id: &str) -> StoryChunk {
        StoryChunk::new(id, format!("content {}", id), ChunkMetadata::default()).unwrap()
    }

    #[test]
    fn test_ensure_embedded() {
        assert!(ensure_embedded(&[]).is_ok());
        assert!(ensure_embedded(&[chunk("a").with_embedding(vec![1.0])]).is_ok());

        let err = ensure_embedded(&[chunk("a").with_embedding(vec![1.0]), chunk("b")])
            .unwrap_err();
        assert!(err.to_string().contains("Chunk b"));

        assert!(ensure_embedded(&[chunk("c").with_embedding(Vec::new())]).is_err());
    }

    #[test]
    fn test_rank_orders_and_truncates() {
        let scored = vec![(chunk("low"), 0.1), (chunk("high"), 0.9), (chunk("mid"), 0.5)];
        let results = rank(scored, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, "high");
        assert_eq!(results[0].rank, 1);
        assert_eq!(results[1].chunk.id, "mid");
        assert_eq!(results[1].rank, 2);
    }

    #[test]
    fn test_stored_copy_records_chunk_id() {
        let stored = stored_copy(&chunk("xyz"));
        assert_eq!(stored.metadata.chunk_id.as_deref(), Some("xyz"));
    }
}
