//! Ingest, search, and answer use cases.
//!
//! [`Services`] bundles one implementation of every seam (loader, chunker,
//! embedder, store, language model) together with the configuration. Both
//! the HTTP server and the CLI hold a `Services` and call into it; tests
//! assemble one from fakes with [`Services::new`].

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::chunk::{StoryChunker, TextChunker};
use crate::config::Config;
use crate::embedding::{create_provider, embed_one, embed_texts, EmbeddingProvider};
use crate::llm::{LanguageModel, OpenAIChatModel, NO_CONTEXT_RESPONSE};
use crate::loader::{is_supported, DocumentLoader, FileDocumentLoader};
use crate::models::{ChunkMetadata, GeneratedResponse, IngestReport, SearchResult, StoryChunk};
use crate::store::{create_store, VectorStore};

#[derive(Clone)]
pub struct Services {
    pub loader: Arc<dyn DocumentLoader>,
    pub chunker: Arc<dyn TextChunker>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub store: Arc<dyn VectorStore>,
    pub llm: Arc<dyn LanguageModel>,
    pub config: Arc<Config>,
}

/// Result of one path visited by [`Services::ingest_paths`].
#[derive(Debug)]
pub enum IngestOutcome {
    Ingested(IngestReport),
    Skipped { path: PathBuf, reason: String },
    Failed { path: PathBuf, error: String },
}

impl Services {
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        chunker: Arc<dyn TextChunker>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn LanguageModel>,
        config: Config,
    ) -> Self {
        Self {
            loader,
            chunker,
            embedder,
            store,
            llm,
            config: Arc::new(config),
        }
    }

    /// Build the production adapters named by `config`.
    ///
    /// # Errors
    ///
    /// Fails if OpenAI embeddings are configured without `OPENAI_API_KEY`, or
    /// the vector store cannot be opened. The chat model defers its key check
    /// to the first prompt.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config.embedding)?);
        let llm = Arc::new(OpenAIChatModel::new(&config.llm)?);
        let store = create_store(&config.vector_store).await?;

        tracing::info!(
            backend = store.backend(),
            embedding_model = embedder.model_name(),
            llm_model = llm.model_name(),
            "services ready"
        );

        Ok(Self::new(
            Arc::new(FileDocumentLoader),
            Arc::new(StoryChunker::from_config(&config.chunking)),
            embedder,
            store,
            llm,
            config.clone(),
        ))
    }

    /// `retrieval.top_k` from the configuration.
    pub fn default_top_k(&self) -> usize {
        self.config.retrieval.top_k
    }

    /// Load, chunk, embed, and store one file.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        let document = self.loader.load(path).await?;

        // Whitespace-only text is left to the chunker, which finds no stories.
        let content = document.content.as_deref().unwrap_or_default();
        if content.is_empty() {
            bail!("No content extracted from {}", path.display());
        }

        let stories = self.chunker.chunk_text(content);
        if stories.is_empty() {
            bail!("No stories found in {}", path.display());
        }

        let embeddings = embed_texts(
            self.embedder.as_ref(),
            &stories,
            self.config.embedding.batch_size,
        )
        .await
        .with_context(|| format!("Failed to embed stories from {}", path.display()))?;

        let title = document.title.clone().or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        });
        let total = stories.len();

        let mut chunks = Vec::with_capacity(total);
        for (index, (story, embedding)) in stories.into_iter().zip(embeddings).enumerate() {
            let metadata = ChunkMetadata {
                source: document.source.clone(),
                title: title.clone(),
                author: document.author.clone(),
                chunk_index: index,
                total_chunks: total,
                chunk_id: None,
            };
            let chunk = StoryChunk::new(Uuid::new_v4().to_string(), story, metadata)?
                .with_embedding(embedding);
            chunks.push(chunk);
        }

        self.store.add_chunks(&chunks).await?;
        tracing::info!(path = %path.display(), stories = total, "ingested file");

        Ok(IngestReport {
            file_path: path.display().to_string(),
            title,
            stories_ingested: total,
            chunks_created: chunks.len(),
        })
    }

    /// Ingest files and directories, recursing into directories.
    ///
    /// Never fails as a whole: every visited path yields an outcome.
    pub async fn ingest_paths(&self, paths: &[PathBuf]) -> Vec<IngestOutcome> {
        let mut outcomes = Vec::new();

        for path in paths {
            for file in expand_path(path, &mut outcomes) {
                if !is_supported(&file) {
                    tracing::warn!(path = %file.display(), "skipping unsupported file");
                    outcomes.push(IngestOutcome::Skipped {
                        path: file,
                        reason: "unsupported file type".to_string(),
                    });
                    continue;
                }

                match self.ingest_file(&file).await {
                    Ok(report) => outcomes.push(IngestOutcome::Ingested(report)),
                    Err(e) => {
                        tracing::warn!(path = %file.display(), "ingest failed: {:#}", e);
                        outcomes.push(IngestOutcome::Failed {
                            path: file,
                            error: format!("{:#}", e),
                        });
                    }
                }
            }
        }

        outcomes
    }

    /// Embed `query` and return the `top_k` closest chunks.
    ///
    /// A blank query returns no results without calling the embedder.
    pub async fn search_stories(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let embedding = embed_one(self.embedder.as_ref(), query).await?;
        let results = self.store.search_similar(&embedding, top_k).await?;
        tracing::debug!(top_k, hits = results.len(), "search complete");
        Ok(results)
    }

    /// Retrieve context for `query` and ask the language model.
    pub async fn generate_response(&self, query: &str, top_k: usize) -> Result<GeneratedResponse> {
        let results = self.search_stories(query, top_k).await?;
        if results.is_empty() {
            return Ok(GeneratedResponse::new(NO_CONTEXT_RESPONSE, Vec::new(), query));
        }

        let citations: Vec<StoryChunk> = results.into_iter().map(|r| r.chunk).collect();
        let response = self.llm.generate_response(query, &citations).await?;
        Ok(GeneratedResponse::new(response, citations, query))
    }
}

/// Files under `path` in a stable order. Missing paths are recorded as skipped.
fn expand_path(path: &Path, outcomes: &mut Vec<IngestOutcome>) -> Vec<PathBuf> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "path not found");
        outcomes.push(IngestOutcome::Skipped {
            path: path.to_path_buf(),
            reason: "not found".to_string(),
        });
        return Vec::new();
    }
    if path.is_file() {
        return vec![path.to_path_buf()];
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => tracing::warn!(path = %path.display(), "walk error: {}", e),
        }
    }
    files
}
