use thiserror::Error;

/// Errors raised while decoding protocol values.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown mode '{0}' (expected one of: architect, coder, debugger, ask)")]
    UnknownMode(String),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
