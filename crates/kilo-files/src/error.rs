use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileToolError {
    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0} is outside the allowed roots")]
    AccessDenied(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Not a text file: {0}")]
    NotText(String),

    #[error("File too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl FileToolError {
    pub fn status_code(&self) -> StatusCode {
        self.parts().0
    }

    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            FileToolError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            FileToolError::AccessDenied(_) => (StatusCode::FORBIDDEN, "ACCESS_DENIED"),
            FileToolError::NotADirectory(_) => (StatusCode::BAD_REQUEST, "NOT_A_DIRECTORY"),
            FileToolError::NotAFile(_) => (StatusCode::BAD_REQUEST, "NOT_A_FILE"),
            FileToolError::NotText(_) => (StatusCode::BAD_REQUEST, "NOT_TEXT"),
            FileToolError::FileTooLarge { .. } => (StatusCode::BAD_REQUEST, "FILE_TOO_LARGE"),
            FileToolError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            FileToolError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        }
    }
}

impl From<JsonRejection> for FileToolError {
    fn from(rejection: JsonRejection) -> Self {
        FileToolError::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for FileToolError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();

        if status.is_server_error() {
            tracing::error!(error_code = code, message = %self, "file tool error");
        } else {
            tracing::debug!(error_code = code, message = %self, "file tool request rejected");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code,
        };

        (status, Json(body)).into_response()
    }
}
