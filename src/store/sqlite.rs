//! SQLite-backed [`VectorStore`].
//!
//! Chunks are stored in one table keyed by `(collection, id)`. Embeddings are
//! little-endian `f32` BLOBs (see [`vec_to_blob`]) and search is a
//! brute-force cosine scan over the collection.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{ChunkMetadata, SearchResult, StoryChunk};

use super::{ensure_embedded, rank, stored_copy, VectorStore};

pub struct SqliteVectorStore {
    pool: SqlitePool,
    collection: String,
}

impl SqliteVectorStore {
    /// Open (creating if needed) the database at `path` and ensure the schema exists.
    pub async fn open(path: &Path, collection: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory {}", parent.display())
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open vector store {}", path.display()))?;

        migrate(&pool).await?;
        tracing::debug!(path = %path.display(), collection, "sqlite vector store ready");

        Ok(Self {
            pool,
            collection: collection.to_string(),
        })
    }
}

async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS story_chunks (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            content TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (collection, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_story_chunks_collection ON story_chunks(collection)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<StoryChunk> {
    let metadata_json: String = row.try_get("metadata_json")?;
    let metadata: ChunkMetadata = serde_json::from_str(&metadata_json)
        .with_context(|| "Corrupt chunk metadata in vector store")?;
    let blob: Vec<u8> = row.try_get("embedding")?;
    Ok(StoryChunk {
        id: row.try_get("id")?,
        content: row.try_get("content")?,
        metadata,
        embedding: Some(blob_to_vec(&blob)),
    })
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn add_chunks(&self, chunks: &[StoryChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        ensure_embedded(chunks)?;

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            let stored = stored_copy(chunk);
            let embedding = stored.embedding.as_deref().unwrap_or_default();
            sqlx::query(
                r#"
                INSERT INTO story_chunks (collection, id, content, metadata_json, embedding, dims, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    content = excluded.content,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding,
                    dims = excluded.dims
                "#,
            )
            .bind(&self.collection)
            .bind(&stored.id)
            .bind(&stored.content)
            .bind(serde_json::to_string(&stored.metadata)?)
            .bind(vec_to_blob(embedding))
            .bind(embedding.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
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

        let rows = sqlx::query(
            "SELECT id, content, metadata_json, embedding FROM story_chunks WHERE collection = ?",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let chunk = row_to_chunk(row)?;
            let sim = chunk
                .embedding
                .as_deref()
                .map(|e| cosine_similarity(query_embedding, e) as f64)
                .unwrap_or(0.0);
            scored.push((chunk, sim));
        }
        Ok(rank(scored, top_k))
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<StoryChunk>> {
        let row = sqlx::query(
            "SELECT id, content, metadata_json, embedding FROM story_chunks WHERE collection = ? AND id = ?",
        )
        .bind(&self.collection)
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_chunk).transpose()
    }

    async fn clear_all(&self) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM story_chunks WHERE collection = ?")
            .bind(&self.collection)
            .execute(&self.pool)
            .await?
            .rows_affected();
        tracing::info!(collection = %self.collection, deleted, "cleared vector store");
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM story_chunks WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }
}
