#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use jstory::chunk::StoryChunker;
use jstory::config::Config;
use jstory::embedding::EmbeddingProvider;
use jstory::llm::LanguageModel;
use jstory::loader::FileDocumentLoader;
use jstory::models::StoryChunk;
use jstory::store::InMemoryVectorStore;
use jstory::usecases::Services;

const VOCAB: &[&str] = &["fox", "crow", "owl", "dragon", "king", "sea"];

/// Embeds text as keyword counts over a tiny vocabulary plus a bias term.
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut v: Vec<f32> = VOCAB
        .iter()
        .map(|w| lower.matches(w).count() as f32)
        .collect();
    v.push(0.1);
    v
}

/// Answers with the titles of the chunks it was given.
pub struct EchoModel {
    pub calls: AtomicUsize,
}

#[async_trait]
impl LanguageModel for EchoModel {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn generate_response(&self, query: &str, context: &[StoryChunk]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let titles: Vec<&str> = context
            .iter()
            .map(|c| c.metadata.title.as_deref().unwrap_or("Untitled"))
            .collect();
        Ok(format!("{} [Source 1] ({})", query, titles.join(", ")))
    }
}

pub struct Harness {
    pub services: Services,
    pub embedder: Arc<KeywordEmbedder>,
    pub llm: Arc<EchoModel>,
}

pub fn harness(config: Config) -> Harness {
    let embedder = Arc::new(KeywordEmbedder {
        calls: AtomicUsize::new(0),
    });
    let llm = Arc::new(EchoModel {
        calls: AtomicUsize::new(0),
    });
    let services = Services::new(
        Arc::new(FileDocumentLoader),
        Arc::new(StoryChunker::from_config(&config.chunking)),
        embedder.clone(),
        Arc::new(InMemoryVectorStore::new()),
        llm.clone(),
        config,
    );
    Harness {
        services,
        embedder,
        llm,
    }
}

pub const FABLES: &str = "The Fox and the Crow\n\
A crow sat on a branch with a piece of cheese. The fox flattered the crow until it sang.\n\
\n\
The Wise Owl\n\
An old owl lived in an oak. The more the owl saw, the less the owl spoke.\n\
\n\
The Dragon King\n\
Beneath the sea a dragon king guarded a pearl. The dragon king slept for a hundred years.";
