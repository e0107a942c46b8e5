//! HTTP API and browser UI.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/` | Upload and search page |
//! | `POST`   | `/api/ingest` | Multipart upload (`files`, repeated) of `.pdf` / `.txt` files |
//! | `POST`   | `/api/search` | `{"query": "...", "top_k": n}` → answer plus citations |
//! | `GET`    | `/api/health` | Status, crate version, and local chunk count |
//! | `GET`    | `/api/chunks/{id}` | One stored chunk |
//! | `DELETE` | `/api/chunks` | Remove every stored chunk |
//!
//! # Error Contract
//!
//! Every error response has the same shape, which is what the UI reads:
//!
//! ```json
//! { "detail": "Query is required" }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{
        multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Multipart, Path,
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::loader::is_supported;
use crate::models::{ChunkMetadata, IngestReport, StoryChunk};
use crate::usecases::Services;

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Clone)]
struct AppState {
    services: Services,
}

/// Build the application router around `services`.
///
/// Exposed separately from [`run_server`] so tests can drive it in-process.
pub fn router(services: Services) -> Router {
    let body_limit = services.config.server.max_upload_mb * 1024 * 1024;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/api/ingest", post(handle_ingest))
        .route("/api/search", post(handle_search))
        .route("/api/health", get(handle_health))
        .route("/api/chunks", delete(handle_clear))
        .route("/api/chunks/{id}", get(handle_get_chunk))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { services })
}

/// Start the HTTP server on `[server].bind` and serve until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Services::from_config(config).await?;
    let app = router(services);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("JStory listening on http://{}", config.server.bind);
    tracing::info!(bind = %config.server.bind, "server started");

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

struct AppError {
    status: StatusCode,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "{}", self.detail);
        }
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

fn bad_request(detail: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        detail: detail.into(),
    }
}

/// Keeps the status axum assigns, so an oversized body is a 413.
fn upload_error(e: MultipartError) -> AppError {
    AppError {
        status: e.status(),
        detail: format!("Invalid upload: {}", e.body_text()),
    }
}

fn not_found(detail: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        detail: detail.into(),
    }
}

fn internal(detail: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        detail: detail.into(),
    }
}

// ============ GET / ============

async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

// ============ POST /api/ingest ============

/// Saves each uploaded file under `data_dir` and ingests it.
///
/// Files are handled in upload order and the first failure aborts the
/// request; files ingested before it stay ingested.
async fn handle_ingest(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Vec<IngestReport>>, AppError> {
    let data_dir = state.services.config.server.data_dir.clone();
    let mut reports = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(upload_error)?
    {
        if field.name() != Some("files") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let base_name = base_file_name(&filename)
            .ok_or_else(|| bad_request("Uploaded file has no name"))?;

        if !is_supported(std::path::Path::new(&base_name)) {
            return Err(bad_request(format!(
                "{} is not a supported file type. Supported: .pdf, .txt",
                filename
            )));
        }

        let bytes = field.bytes().await.map_err(upload_error)?;

        tokio::fs::create_dir_all(&data_dir)
            .await
            .map_err(|e| internal(format!("Error processing {}: {}", filename, e)))?;
        let file_path = data_dir.join(&base_name);
        tokio::fs::write(&file_path, &bytes)
            .await
            .map_err(|e| internal(format!("Error processing {}: {}", filename, e)))?;

        match state.services.ingest_file(&file_path).await {
            Ok(report) => reports.push(report),
            Err(e) => {
                let _ = tokio::fs::remove_file(&file_path).await;
                return Err(internal(format!("Error processing {}: {:#}", filename, e)));
            }
        }
    }

    if reports.is_empty() {
        return Err(bad_request("No files uploaded"));
    }
    Ok(Json(reports))
}

/// Final path component of a client-supplied file name, with either slash style.
fn base_file_name(name: &str) -> Option<String> {
    let normalized = name.replace('\\', "/");
    std::path::Path::new(&normalized)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
}

// ============ POST /api/search ============

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct Citation {
    content: String,
    metadata: ChunkMetadata,
}

#[derive(Serialize)]
struct SearchResponse {
    query: String,
    response: String,
    citations: Vec<Citation>,
}

async fn handle_search(
    State(state): State<AppState>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let Json(request) = body.map_err(|e| bad_request(e.body_text()))?;

    // A whitespace query is answered with the no-context fallback.
    let query = request.query.unwrap_or_default();
    if query.is_empty() {
        return Err(bad_request("Query is required"));
    }
    let top_k = request
        .top_k
        .unwrap_or_else(|| state.services.default_top_k());
    if top_k == 0 {
        return Err(bad_request("top_k must be >= 1"));
    }

    let generated = state
        .services
        .generate_response(&query, top_k)
        .await
        .map_err(|e| internal(format!("Error searching stories: {:#}", e)))?;

    Ok(Json(SearchResponse {
        query: generated.query,
        response: generated.response,
        citations: generated
            .citations
            .into_iter()
            .map(|c| Citation {
                content: c.content,
                metadata: c.metadata,
            })
            .collect(),
    }))
}

// ============ GET /api/health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    /// Omitted for remote stores and when the store cannot be counted.
    #[serde(skip_serializing_if = "Option::is_none")]
    chunks: Option<usize>,
}

/// Answers without touching the network: remote stores are not counted.
async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = &state.services.store;
    let chunks = if store.is_remote() {
        None
    } else {
        match store.count().await {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::warn!("health check could not count chunks: {:#}", e);
                None
            }
        }
    };
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        chunks,
    })
}

// ============ /api/chunks ============

#[derive(Serialize)]
struct ChunkResponse {
    id: String,
    content: String,
    metadata: ChunkMetadata,
}

impl From<StoryChunk> for ChunkResponse {
    fn from(chunk: StoryChunk) -> Self {
        Self {
            id: chunk.id,
            content: chunk.content,
            metadata: chunk.metadata,
        }
    }
}

async fn handle_get_chunk(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ChunkResponse>, AppError> {
    let chunk = state
        .services
        .store
        .get_chunk(&id)
        .await
        .map_err(|e| internal(format!("Error reading chunk {}: {:#}", id, e)))?
        .ok_or_else(|| not_found(format!("Chunk not found: {}", id)))?;
    Ok(Json(chunk.into()))
}

#[derive(Serialize)]
struct ClearResponse {
    cleared: usize,
}

async fn handle_clear(State(state): State<AppState>) -> Result<Json<ClearResponse>, AppError> {
    let store = &state.services.store;
    let cleared = store
        .count()
        .await
        .map_err(|e| internal(format!("Error clearing stories: {:#}", e)))?;
    store
        .clear_all()
        .await
        .map_err(|e| internal(format!("Error clearing stories: {:#}", e)))?;
    tracing::info!(cleared, "vector store cleared over HTTP");
    Ok(Json(ClearResponse { cleared }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_file_name_strips_directories() {
        assert_eq!(base_file_name("tales.txt").as_deref(), Some("tales.txt"));
        assert_eq!(base_file_name("../../etc/tales.txt").as_deref(), Some("tales.txt"));
        assert_eq!(base_file_name(r"C:\Users\me\book.pdf").as_deref(), Some("book.pdf"));
        assert_eq!(base_file_name(""), None);
        assert_eq!(base_file_name(".."), None);
    }

    #[test]
    fn test_error_body_shape() {
        let body = serde_json::to_value(ErrorBody {
            detail: "Query is required".to_string(),
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "detail": "Query is required" }));
    }
}
