//! # JStory CLI (`jstory`)
//!
//! Ingest story collections, query them, and run the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! jstory --config ./config/jstory.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `jstory serve` | Start the HTTP API and browser UI |
//! | `jstory ingest <paths>...` | Ingest `.txt` / `.pdf` files or directories |
//! | `jstory search "<query>"` | Show the closest story excerpts |
//! | `jstory ask "<query>"` | Answer a question with cited sources |
//! | `jstory clear` | Remove every stored chunk |
//! | `jstory stats` | Show chunk count, backend, and models |
//!
//! `OPENAI_API_KEY` must be set for OpenAI embeddings and for `serve` and
//! `ask`, which call the chat model. With Ollama embeddings the other
//! commands run without it.
//! Log verbosity follows `RUST_LOG` (default `jstory=info`); logs go to
//! stderr so command output on stdout stays clean.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use jstory::config::{self, Config};
use jstory::server;
use jstory::usecases::{IngestOutcome, Services};

/// JStory: semantic search and question answering over story collections.
#[derive(Parser)]
#[command(name = "jstory", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Built-in defaults are used when the file does not exist.
    #[arg(long, global = true, default_value = "./config/jstory.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    Serve,

    /// Ingest story files. Directories are walked recursively.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Print the story excerpts closest to a query.
    Search {
        query: String,

        /// Number of results (defaults to `retrieval.top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Answer a question from the ingested stories.
    Ask {
        query: String,

        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Remove every chunk from the vector store.
    Clear,

    /// Show store and model information.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jstory=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            config::openai_api_key()?;
            server::run_server(&cfg).await?
        }
        Commands::Ingest { paths } => run_ingest(&cfg, &paths).await?,
        Commands::Search { query, top_k } => run_search(&cfg, &query, top_k).await?,
        Commands::Ask { query, top_k } => run_ask(&cfg, &query, top_k).await?,
        Commands::Clear => {
            let services = Services::from_config(&cfg).await?;
            let n = services.store.count().await?;
            services.store.clear_all().await?;
            println!("Cleared {} chunks.", n);
        }
        Commands::Stats => {
            let services = Services::from_config(&cfg).await?;
            println!("Chunks:          {}", services.store.count().await?);
            println!("Backend:         {}", services.store.backend());
            println!("Embedding model: {}", services.embedder.model_name());
            println!("LLM model:       {}", services.llm.model_name());
        }
    }

    Ok(())
}

async fn run_ingest(cfg: &Config, paths: &[PathBuf]) -> Result<()> {
    let services = Services::from_config(cfg).await?;
    let outcomes = services.ingest_paths(paths).await;

    let mut files = 0;
    let mut stories = 0;
    let mut failed = 0;
    for outcome in &outcomes {
        match outcome {
            IngestOutcome::Ingested(report) => {
                files += 1;
                stories += report.stories_ingested;
                println!(
                    "✓ {}: {} stories ingested",
                    report.title.as_deref().unwrap_or(&report.file_path),
                    report.stories_ingested
                );
            }
            IngestOutcome::Skipped { path, reason } => {
                println!("- skipped {}: {}", path.display(), reason);
            }
            IngestOutcome::Failed { path, error } => {
                failed += 1;
                println!("✗ {}: {}", path.display(), error);
            }
        }
    }

    println!("Ingested {} file(s), {} stories.", files, stories);
    if failed > 0 {
        bail!("{} file(s) failed to ingest", failed);
    }
    Ok(())
}

async fn run_search(cfg: &Config, query: &str, top_k: Option<usize>) -> Result<()> {
    let services = Services::from_config(cfg).await?;
    let top_k = top_k.unwrap_or_else(|| services.default_top_k());
    let results = services.search_stories(query, top_k).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for result in &results {
        let meta = &result.chunk.metadata;
        println!(
            "{}. [{:.3}] {} ({})",
            result.rank,
            result.score,
            meta.title.as_deref().unwrap_or("Untitled"),
            meta.source
        );
        println!("   {}", excerpt(&result.chunk.content, 200));
        println!();
    }
    Ok(())
}

async fn run_ask(cfg: &Config, query: &str, top_k: Option<usize>) -> Result<()> {
    config::openai_api_key()?;
    let services = Services::from_config(cfg).await?;
    let top_k = top_k.unwrap_or_else(|| services.default_top_k());
    let answer = services.generate_response(query, top_k).await?;

    println!("{}", answer.response);
    if !answer.citations.is_empty() {
        println!();
        println!("Sources:");
        for (i, chunk) in answer.citations.iter().enumerate() {
            println!(
                "  [{}] {} from {}",
                i + 1,
                chunk.metadata.title.as_deref().unwrap_or("Untitled"),
                chunk.metadata.source
            );
        }
    }
    Ok(())
}

/// First `max_chars` characters of `text` on one line.
fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut)
}
