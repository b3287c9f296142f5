//! HTTP agent service transport.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
use kilo_protocol::{BridgeInput, FrameDecoder, Mode, StreamEvent, extract_token};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::{AgentError, AgentEvent, AgentEventStream, AgentRunner, AgentStreamer};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Agent reached over HTTP at a single base address.
///
/// - `POST {base}/agent/run` returns the terminal JSON result.
/// - `POST {base}/agent/stream` returns `data:` frames ending in `[DONE]`.
#[derive(Debug, Clone)]
pub struct HttpAgent {
    client: Client,
    base_url: String,
}

impl HttpAgent {
    pub fn new(base_url: impl Into<String>) -> Result<Self, AgentError> {
        // No overall timeout: streams stay open as long as the agent works.
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|err| AgentError::Unavailable(format!("failed to build HTTP client: {err}")))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(
        &self,
        path: &str,
        mode: Mode,
        input: Value,
        accept: &str,
    ) -> Result<reqwest::Response, AgentError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(%url, %mode, "calling agent service");

        let response = self
            .client
            .post(&url)
            .header("Accept", accept)
            .json(&BridgeInput { mode, input })
            .send()
            .await
            .map_err(|err| AgentError::Unavailable(format!("{url}: {err}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = format!("agent service returned {status}: {}", body.trim());
        Err(match status {
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
                AgentError::Unavailable(message)
            }
            _ => AgentError::Failed(message),
        })
    }
}

#[async_trait]
impl AgentRunner for HttpAgent {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn run(&self, mode: Mode, input: Value) -> Result<Value, AgentError> {
        let response = self.post("agent/run", mode, input, "application/json").await?;
        let bytes = response.bytes().await.map_err(|err| {
            AgentError::Unavailable(format!("agent response body was cut off: {err}"))
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|err| AgentError::Malformed(format!("agent response is not JSON: {err}")))
    }
}

#[async_trait]
impl AgentStreamer for HttpAgent {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn run_stream(&self, mode: Mode, input: Value) -> Result<AgentEventStream, AgentError> {
        let response = self
            .post("agent/stream", mode, input, "text/event-stream")
            .await?;
        Ok(sse_events(response.bytes_stream()))
    }
}

struct SseState<S> {
    body: Pin<Box<S>>,
    decoder: FrameDecoder,
    pending: VecDeque<StreamEvent>,
}

/// Decode a `text/event-stream` body into agent events.
///
/// `[DONE]` yields [`AgentEvent::Done`] and ends the stream. A body that ends,
/// or fails, before that yields [`AgentError::StreamInterrupted`].
pub fn sse_events<S, E>(body: S) -> AgentEventStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = SseState {
        body: Box::pin(body),
        decoder: FrameDecoder::new(),
        pending: VecDeque::new(),
    };

    Box::pin(stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        loop {
            if let Some(event) = state.pending.pop_front() {
                return match event {
                    StreamEvent::Done => Some((Ok(AgentEvent::Done), None)),
                    StreamEvent::Chunk(payload) => {
                        Some((Ok(AgentEvent::Chunk(extract_token(&payload))), Some(state)))
                    }
                };
            }

            match state.body.next().await {
                Some(Ok(bytes)) => {
                    let events = state.decoder.push(&bytes);
                    state.pending.extend(events);
                }
                Some(Err(err)) => {
                    warn!("agent stream failed mid-body: {}", err);
                    return Some((Err(AgentError::StreamInterrupted), None));
                }
                None => {
                    if state.decoder.has_partial_frame() {
                        warn!("agent stream closed inside a frame");
                    }
                    return Some((Err(AgentError::StreamInterrupted), None));
                }
            }
        }
    }))
}
