//! # JStory
//!
//! Retrieval-augmented question answering over story collections.
//!
//! JStory ingests PDF and plain-text story collections, splits them into
//! one chunk per story, embeds the chunks, and stores them in a vector
//! store. Questions are answered by retrieving the closest stories and
//! asking a chat model for an answer that cites them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────────────┐   ┌──────────────┐
//! │ HTTP  /  CLI │──▶│ usecases::Services      │──▶│ VectorStore  │
//! │ (axum, clap) │   │ ingest · search · ask   │   │ SQLite/Chroma│
//! └──────────────┘   └───────────┬─────────────┘   └──────────────┘
//!                                │
//!            ┌───────────┬───────┴──────┬──────────────┐
//!            ▼           ▼              ▼              ▼
//!       DocumentLoader TextChunker EmbeddingProvider LanguageModel
//!       (txt, pdf)     (stories)   (OpenAI, Ollama)  (OpenAI chat)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`loader`] | `.txt` / `.pdf` document loading |
//! | [`chunk`] | Story-boundary chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector store backends |
//! | [`llm`] | Prompt construction and chat completion |
//! | [`usecases`] | Ingest, search, and answer orchestration |
//! | [`server`] | HTTP API and browser UI |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod llm;
pub mod loader;
pub mod models;
pub mod server;
pub mod store;
pub mod usecases;
