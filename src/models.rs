//! Core data models used throughout JStory.
//!
//! These types represent the documents, story chunks, search results, and
//! generated answers that flow through the ingest and query pipelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation failures for [`StoryChunk`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("Chunk ID cannot be empty")]
    EmptyId,
    #[error("Chunk content cannot be empty")]
    EmptyContent,
}

/// Metadata attached to every stored chunk.
///
/// Serialized as a flat JSON object, which is also the shape returned in
/// search citations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub chunk_index: usize,
    #[serde(default)]
    pub total_chunks: usize,
    /// Set by the vector store when the chunk is persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
}

/// A chunk of text from a story, usually one whole story.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryChunk {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub embedding: Option<Vec<f32>>,
}

impl StoryChunk {
    /// Build a chunk without an embedding, rejecting empty ids and blank content.
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        metadata: ChunkMetadata,
    ) -> Result<Self, ModelError> {
        let id = id.into();
        let content = content.into();
        if id.is_empty() {
            return Err(ModelError::EmptyId);
        }
        if content.trim().is_empty() {
            return Err(ModelError::EmptyContent);
        }
        Ok(Self {
            id,
            content,
            metadata,
            embedding: None,
        })
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// A loaded source file before chunking.
#[derive(Debug, Clone, Default)]
pub struct StoryDocument {
    /// File path or other source identifier.
    pub source: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub content: Option<String>,
}

/// A retrieved chunk with its relevance score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk: StoryChunk,
    /// `1 - distance`; higher is more relevant.
    pub score: f64,
    /// 1-based position in the result list.
    pub rank: usize,
}

/// An LLM answer plus the chunks it was grounded on.
#[derive(Debug, Clone)]
pub struct GeneratedResponse {
    pub response: String,
    pub citations: Vec<StoryChunk>,
    pub query: String,
    pub timestamp: DateTime<Utc>,
}

impl GeneratedResponse {
    pub fn new(response: impl Into<String>, citations: Vec<StoryChunk>, query: &str) -> Self {
        Self {
            response: response.into(),
            citations,
            query: query.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Outcome of ingesting one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub file_path: String,
    pub title: Option<String>,
    pub stories_ingested: usize,
    pub chunks_created: usize,
}
