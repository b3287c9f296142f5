//! Read-only file tools for the kilo agent.
//!
//! Serves `POST /tools/fs/index`, `/tools/fs/snippet` and `/tools/fs/search`
//! confined to a set of allowed root directories. It can run as the
//! standalone `kilo-files` binary or be embedded in another router.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod tools;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;

pub use config::Config;
pub use error::FileToolError;
pub use tools::FileTools;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub tools: Arc<FileTools>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Create state confined to `roots`; relative paths resolve against the first.
    pub fn new(roots: Vec<PathBuf>, config: Config) -> Result<Self, FileToolError> {
        let config = Arc::new(config);
        let tools = FileTools::new(roots, config.clone())?;
        Ok(Self {
            tools: Arc::new(tools),
            config,
        })
    }
}

/// Router with all file tool routes and state applied.
pub fn router(state: AppState) -> Router {
    Router::new().merge(routes::file_routes()).with_state(state)
}
