use axum::{Json, extract::State, extract::rejection::JsonRejection};
use kilo_protocol::{FileIndex, FileIndexRequest};
use serde::Serialize;
use tracing::debug;

use crate::AppState;
use crate::error::FileToolError;
use crate::tools::{FileTools, SearchRequest, SearchResults, Snippet, SnippetRequest};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub roots: Vec<String>,
}

/// GET /health - Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        roots: state
            .tools
            .roots()
            .iter()
            .map(|root| root.display().to_string())
            .collect(),
    })
}

/// POST /tools/fs/index - List files below a directory
pub async fn index_files(
    State(state): State<AppState>,
    body: Result<Json<FileIndexRequest>, JsonRejection>,
) -> Result<Json<FileIndex>, FileToolError> {
    let Json(request) = body?;
    debug!("Indexing {} (max_depth {})", request.path, request.max_depth);
    let index = run_blocking(state.tools.clone(), move |tools| tools.index(&request)).await?;
    Ok(Json(index))
}

/// POST /tools/fs/snippet - Read a window of lines from a text file
pub async fn read_snippet(
    State(state): State<AppState>,
    body: Result<Json<SnippetRequest>, JsonRejection>,
) -> Result<Json<Snippet>, FileToolError> {
    let Json(request) = body?;
    let snippet = run_blocking(state.tools.clone(), move |tools| tools.snippet(&request)).await?;
    Ok(Json(snippet))
}

/// POST /tools/fs/search - Case-insensitive text search
pub async fn search_files(
    State(state): State<AppState>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResults>, FileToolError> {
    let Json(request) = body?;
    let results = run_blocking(state.tools.clone(), move |tools| tools.search(&request)).await?;
    Ok(Json(results))
}

async fn run_blocking<T, F>(tools: std::sync::Arc<FileTools>, op: F) -> Result<T, FileToolError>
where
    T: Send + 'static,
    F: FnOnce(&FileTools) -> Result<T, FileToolError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || op(&tools))
        .await
        .map_err(|err| FileToolError::Io(std::io::Error::other(err.to_string())))?
}
