//! Pass-through client for the external file-index capability.

use std::time::Duration;

use axum::{body::Bytes, http::StatusCode};
use kilo_protocol::FileIndexRequest;
use serde::{Deserialize, de::IgnoredAny};
use serde_json::{Map, Value};
use tracing::debug;

use super::error::{ApiError, ApiResult};

const FILE_INDEX_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct FileIndexClient {
    client: reqwest::Client,
    base_url: String,
}

impl FileIndexClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(FILE_INDEX_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Forward an index request and hand back the backend's status and body.
    ///
    /// The body is checked against [`FileIndexRequest`] and missing fields
    /// are filled with their defaults; everything else is sent as received.
    /// The backend's body is returned byte for byte once it is known to be
    /// JSON.
    pub async fn index(&self, body: Value) -> ApiResult<(StatusCode, Bytes)> {
        let Value::Object(fields) = body else {
            return Err(ApiError::invalid_request("expected a JSON object"));
        };
        let fields = with_defaults(fields)?;

        let url = format!("{}/tools/fs/index", self.base_url);
        debug!(url = %url, "forwarding file index request");
        let response = self
            .client
            .post(&url)
            .json(&fields)
            .send()
            .await
            .map_err(|err| ApiError::backend_unavailable(format!("{url}: {err}")))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|err| {
            ApiError::bad_gateway(format!("file index response from {url} was cut off: {err}"))
        })?;
        serde_json::from_slice::<IgnoredAny>(&body).map_err(|err| {
            ApiError::bad_gateway(format!("file index returned {status} with a non-JSON body: {err}"))
        })?;
        Ok((status, body))
    }
}

fn with_defaults(mut fields: Map<String, Value>) -> ApiResult<Map<String, Value>> {
    let request = FileIndexRequest::deserialize(&Value::Object(fields.clone()))
        .map_err(|err| ApiError::invalid_request(err.to_string()))?;

    fields
        .entry("path")
        .or_insert_with(|| Value::String(request.path.clone()));
    fields
        .entry("max_depth")
        .or_insert_with(|| Value::from(request.max_depth));
    Ok(fields)
}
