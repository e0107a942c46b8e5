//! Document loading for story collections.
//!
//! Plain-text files are read as UTF-8; PDF files go through `pdf-extract`.
//! The file stem becomes the document title.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::StoryDocument;

/// Extensions accepted by the loader, lower-case and without the dot.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt"];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Unsupported file type: {0}. Supported: .txt, .pdf")]
    UnsupportedType(String),
    #[error("Error reading file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF extraction failed for {}: {message}", path.display())]
    Pdf { path: PathBuf, message: String },
}

/// Loads a file from disk into a [`StoryDocument`].
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, path: &Path) -> Result<StoryDocument, LoadError>;
}

/// Lower-cased extension of `path`, or an empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn is_supported(path: &Path) -> bool {
    SUPPORTED_EXTENSIONS.contains(&extension_of(path).as_str())
}

/// Loader for `.txt` and `.pdf` files on the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileDocumentLoader;

#[async_trait]
impl DocumentLoader for FileDocumentLoader {
    async fn load(&self, path: &Path) -> Result<StoryDocument, LoadError> {
        if !path.exists() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }

        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned());

        let content = match extension_of(path).as_str() {
            "txt" => tokio::fs::read_to_string(path)
                .await
                .map_err(|source| LoadError::Read {
                    path: path.to_path_buf(),
                    source,
                })?,
            "pdf" => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|source| LoadError::Read {
                        path: path.to_path_buf(),
                        source,
                    })?;
                let owned = path.to_path_buf();
                // pdf-extract is CPU bound and synchronous
                tokio::task::spawn_blocking(move || extract_pdf(&owned, &bytes))
                    .await
                    .map_err(|e| LoadError::Pdf {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    })??
            }
            other => return Err(LoadError::UnsupportedType(format!(".{}", other))),
        };

        Ok(StoryDocument {
            source: path.to_string_lossy().into_owned(),
            title,
            author: None,
            content: Some(content),
        })
    }
}

fn extract_pdf(path: &Path, bytes: &[u8]) -> Result<String, LoadError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| LoadError::Pdf {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
