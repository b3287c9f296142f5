//! Client for a running gateway, used by the `kilo plan` and `kilo execute`
//! commands.

use std::time::Duration;

use futures::StreamExt;
use kilo_protocol::{ChatMessage, ExecutionRequest, FrameDecoder, Plan, PlanRequest, StreamEvent};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("gateway returned {status}: {message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("stream closed before completion")]
    StreamInterrupted,

    #[error("unexpected response: {0}")]
    Decode(String),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    base_url: String,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ask the planner for steps.
    pub async fn plan(&self, messages: Vec<ChatMessage>) -> Result<Plan, ClientError> {
        let response = self
            .client
            .post(format!("{}/plan", self.base_url))
            .json(&PlanRequest { messages })
            .send()
            .await?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|err| ClientError::Decode(err.to_string()))
    }

    /// Run a request and hand every chunk payload to `on_chunk` as it arrives.
    ///
    /// Succeeds only once `[DONE]` has been received, returning the number of
    /// chunks seen. A body that ends without it is
    /// [`ClientError::StreamInterrupted`].
    pub async fn execute<F>(
        &self,
        request: &ExecutionRequest,
        mut on_chunk: F,
    ) -> Result<usize, ClientError>
    where
        F: FnMut(&str),
    {
        let response = self
            .client
            .post(format!("{}/execute", self.base_url))
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;
        let response = check_status(response).await?;

        let mut body = response.bytes_stream();
        let mut decoder = FrameDecoder::new();
        let mut chunks = 0;
        while let Some(bytes) = body.next().await {
            let bytes = bytes.map_err(|err| {
                debug!("event stream read failed: {}", err);
                ClientError::StreamInterrupted
            })?;
            for event in decoder.push(&bytes) {
                match event {
                    StreamEvent::Chunk(payload) => {
                        chunks += 1;
                        on_chunk(&payload);
                    }
                    StreamEvent::Done => return Ok(chunks),
                }
            }
        }
        Err(ClientError::StreamInterrupted)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => (body.code, body.error),
        Err(_) => (None, text),
    };
    Err(ClientError::Status {
        status: status.as_u16(),
        code,
        message,
    })
}
