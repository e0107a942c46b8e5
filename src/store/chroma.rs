//! [`VectorStore`] backed by a Chroma server (REST API v1).
//!
//! The collection is resolved lazily with `get_or_create` on first use and
//! its id cached; [`clear_all`](VectorStore::clear_all) deletes the whole
//! collection and forgets the id so the next call recreates it.
//!
//! Chroma metadata values must be scalars, so nulls are dropped and nested
//! values are sent as their JSON text.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::models::{ChunkMetadata, SearchResult, StoryChunk};

use super::{ensure_embedded, stored_copy, VectorStore};

const COLLECTION_DESCRIPTION: &str = "Story chunks for semantic search";

pub struct ChromaVectorStore {
    client: reqwest::Client,
    url: String,
    collection_name: String,
    collection_id: Mutex<Option<String>>,
}

#[derive(Deserialize)]
struct CollectionInfo {
    id: String,
}

#[derive(Deserialize, Default)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Value>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f64>>>>,
}

#[derive(Deserialize, Default)]
struct GetResponse {
    ids: Vec<String>,
    #[serde(default)]
    documents: Option<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Option<Vec<Option<Value>>>,
    #[serde(default)]
    embeddings: Option<Vec<Option<Vec<f32>>>>,
}

impl ChromaVectorStore {
    pub fn new(url: &str, collection_name: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            collection_name: collection_name.to_string(),
            collection_id: Mutex::new(None),
        })
    }

    async fn collection_id(&self) -> Result<String> {
        let mut cached = self.collection_id.lock().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let body = json!({
            "name": self.collection_name,
            "metadata": { "description": COLLECTION_DESCRIPTION },
            "get_or_create": true,
        });
        let info: CollectionInfo = self
            .post_json(&format!("{}/api/v1/collections", self.url), &body)
            .await?;
        tracing::debug!(collection = %self.collection_name, id = %info.id, "resolved chroma collection");
        *cached = Some(info.id.clone());
        Ok(info.id)
    }

    async fn post_json<T: serde::de::DeserializeOwned>(&self, url: &str, body: &Value) -> Result<T> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| anyhow!("Chroma connection error (is Chroma running at {}?): {}", self.url, e))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Chroma API error {}: {}", status, text);
        }
        Ok(response.json().await?)
    }
}

/// Flatten chunk metadata into the scalar-only map Chroma accepts.
fn to_chroma_metadata(metadata: &ChunkMetadata) -> Result<Map<String, Value>> {
    let value = serde_json::to_value(metadata)?;
    let Value::Object(map) = value else {
        bail!("chunk metadata did not serialize to an object");
    };
    Ok(map
        .into_iter()
        .filter_map(|(k, v)| match v {
            Value::Null => None,
            Value::Array(_) | Value::Object(_) => Some((k, Value::String(v.to_string()))),
            scalar => Some((k, scalar)),
        })
        .collect())
}

fn from_chroma_metadata(value: Option<Value>) -> ChunkMetadata {
    match value {
        Some(v) => serde_json::from_value(v).unwrap_or_else(|e| {
            tracing::warn!("unreadable chunk metadata from chroma: {}", e);
            ChunkMetadata::default()
        }),
        None => ChunkMetadata::default(),
    }
}

/// Convert the first (and only) query row into ranked results.
fn query_to_results(resp: QueryResponse) -> Vec<SearchResult> {
    let ids = resp.ids.into_iter().next().unwrap_or_default();
    let mut documents = resp
        .documents
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default()
        .into_iter();
    let mut metadatas = resp
        .metadatas
        .and_then(|m| m.into_iter().next())
        .unwrap_or_default()
        .into_iter();
    let mut distances = resp
        .distances
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default()
        .into_iter();

    ids.into_iter()
        .enumerate()
        .map(|(i, id)| {
            let content = documents.next().flatten().unwrap_or_default();
            let metadata = from_chroma_metadata(metadatas.next().flatten());
            let score = distances.next().flatten().map(|d| 1.0 - d).unwrap_or(1.0);
            SearchResult {
                chunk: StoryChunk {
                    id,
                    content,
                    metadata,
                    embedding: None,
                },
                score,
                rank: i + 1,
            }
        })
        .collect()
}

fn get_to_chunk(resp: GetResponse) -> Option<StoryChunk> {
    let id = resp.ids.into_iter().next()?;
    let content = resp
        .documents
        .and_then(|d| d.into_iter().next().flatten())
        .unwrap_or_default();
    let metadata = from_chroma_metadata(resp.metadatas.and_then(|m| m.into_iter().next().flatten()));
    let embedding = resp
        .embeddings
        .and_then(|e| e.into_iter().next().flatten());
    Some(StoryChunk {
        id,
        content,
        metadata,
        embedding,
    })
}

#[async_trait]
impl VectorStore for ChromaVectorStore {
    fn backend(&self) -> &'static str {
        "chroma"
    }

    fn is_remote(&self) -> bool {
        true
    }

    async fn add_chunks(&self, chunks: &[StoryChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        ensure_embedded(chunks)?;

        let mut ids = Vec::with_capacity(chunks.len());
        let mut embeddings = Vec::with_capacity(chunks.len());
        let mut documents = Vec::with_capacity(chunks.len());
        let mut metadatas = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let stored = stored_copy(chunk);
            metadatas.push(Value::Object(to_chroma_metadata(&stored.metadata)?));
            ids.push(stored.id);
            embeddings.push(stored.embedding.unwrap_or_default());
            documents.push(stored.content);
        }

        let id = self.collection_id().await?;
        let body = json!({
            "ids": ids,
            "embeddings": embeddings,
            "documents": documents,
            "metadatas": metadatas,
        });
        let _: Value = self
            .post_json(&format!("{}/api/v1/collections/{}/add", self.url, id), &body)
            .await?;
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
        let id = self.collection_id().await?;
        let body = json!({
            "query_embeddings": [query_embedding],
            "n_results": top_k,
            "include": ["documents", "metadatas", "distances"],
        });
        let resp: QueryResponse = self
            .post_json(&format!("{}/api/v1/collections/{}/query", self.url, id), &body)
            .await?;
        Ok(query_to_results(resp))
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<StoryChunk>> {
        let id = self.collection_id().await?;
        let body = json!({
            "ids": [chunk_id],
            "include": ["documents", "metadatas", "embeddings"],
        });
        let resp: GetResponse = self
            .post_json(&format!("{}/api/v1/collections/{}/get", self.url, id), &body)
            .await?;
        Ok(get_to_chunk(resp))
    }

    async fn clear_all(&self) -> Result<()> {
        let mut cached = self.collection_id.lock().await;
        let response = self
            .client
            .delete(format!(
                "{}/api/v1/collections/{}",
                self.url, self.collection_name
            ))
            .send()
            .await
            .map_err(|e| anyhow!("Chroma connection error (is Chroma running at {}?): {}", self.url, e))?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(collection = %self.collection_name, "deleted chroma collection");
        } else {
            // Usually the collection never existed.
            tracing::debug!(collection = %self.collection_name, %status, "chroma delete ignored");
        }
        *cached = None;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let id = self.collection_id().await?;
        let response = self
            .client
            .get(format!("{}/api/v1/collections/{}/count", self.url, id))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Chroma API error {}: {}", status, text);
        }
        Ok(response.json::<usize>().await?)
    }
}
