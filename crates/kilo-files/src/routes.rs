use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;
use crate::handlers;

/// Create file tool routes
pub fn file_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/tools/fs/index", post(handlers::index_files))
        .route("/tools/fs/snippet", post(handlers::read_snippet))
        .route("/tools/fs/search", post(handlers::search_files))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app(dir: &TempDir) -> Router {
        let state = AppState::new(vec![dir.path().to_path_buf()], Config::default()).unwrap();
        crate::router(state)
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .method(Method::POST)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn index_endpoint_returns_totals() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let (status, json) =
            post_json(app(&dir), "/tools/fs/index", json!({"path": ".", "max_depth": 2})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json,
            json!({
                "files": [{"path": "./a.txt", "size": 5, "type": "text"}],
                "total_files": 1,
                "total_dirs": 1
            })
        );
    }

    #[tokio::test]
    async fn index_endpoint_denies_escape() {
        let dir = TempDir::new().unwrap();
        let (status, json) =
            post_json(app(&dir), "/tools/fs/index", json!({"path": "/", "max_depth": 1})).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["code"], "ACCESS_DENIED");
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let (status, json) =
            post_json(app(&dir), "/tools/fs/index", json!({"max_depth": "deep"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "INVALID_REQUEST");
    }
}
