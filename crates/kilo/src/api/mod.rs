//! Gateway / Router - HTTP surface of the relay.
//!
//! Handlers decode the body, call into the plan service, the execution
//! relay or the file-index client, and map failures onto [`ApiError`].

mod error;
mod files;
mod handlers;
mod routes;
mod state;
mod stream;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use files::FileIndexClient;
pub use handlers::HealthResponse;
pub use routes::create_router;
pub use state::AppState;
pub use stream::sse_response;
