//! Execution Relay - forward agent output to the caller as it is produced.
//!
//! A relayed stream yields chunks in agent order and ends in exactly one of
//! two ways:
//!
//! - `Ok(StreamEvent::Done)` when the agent finished, after which nothing
//!   else is yielded;
//! - `Err(_)` when the agent failed, stalled or vanished mid-stream. No
//!   completion marker follows, so consumers can tell a cut-off run from a
//!   finished one.
//!
//! Dropping the stream drops the agent stream with it, which releases the
//! underlying connection or subprocess.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, stream};
use kilo_protocol::{DONE_SENTINEL, ExecutionRequest, StreamEvent};
use serde_json::Value;
use thiserror::Error;
use tokio_stream::Stream;
use tracing::{debug, instrument, warn};

use crate::agent::{AgentError, AgentEvent, AgentEventStream, AgentInvoker};

/// Longest wait for the next agent event before the run is abandoned.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Agent(#[from] AgentError),
}

pub type RelayStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, RelayError>> + Send>>;

#[derive(Clone)]
pub struct ExecutionRelay {
    invoker: Arc<AgentInvoker>,
    idle_timeout: Duration,
}

impl ExecutionRelay {
    pub fn new(invoker: Arc<AgentInvoker>) -> Self {
        Self {
            invoker,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Validate `request`, start the agent and return its relayed output.
    ///
    /// Requests without a plan or messages are rejected before the agent is
    /// contacted.
    #[instrument(skip_all, fields(mode = %request.mode))]
    pub async fn execute(&self, request: ExecutionRequest) -> Result<RelayStream, RelayError> {
        if request.is_missing_primary_input() {
            return Err(RelayError::InvalidRequest(
                "either plan or messages must be provided".to_string(),
            ));
        }

        let input = compose_input(&request)
            .map_err(|err| RelayError::InvalidRequest(format!("unencodable request: {err}")))?;
        let events = self.invoker.invoke_stream(request.mode, input).await?;
        debug!("agent stream opened");

        Ok(relay_events(events, self.idle_timeout))
    }
}

/// Build the agent input from the fields the caller supplied.
///
/// Keys are `plan`, `messages`, `customRules` and `projectContext`; absent
/// fields are left out rather than sent as null.
pub fn compose_input(request: &ExecutionRequest) -> Result<Value, serde_json::Error> {
    let mut input = serde_json::to_value(request)?;
    if let Value::Object(fields) = &mut input {
        fields.remove("mode");
    }
    Ok(input)
}

struct Relay {
    events: AgentEventStream,
    idle: Duration,
}

/// Adapt agent events into relay events, bounding the wait for each one.
///
/// An agent stream that ends without signaling an error is treated as
/// finished. A chunk whose text is the completion marker would be
/// indistinguishable from completion on the wire, so it fails the run.
pub fn relay_events(events: AgentEventStream, idle: Duration) -> RelayStream {
    Box::pin(stream::unfold(
        Some(Relay { events, idle }),
        |state| async move {
            let mut relay = state?;
            match tokio::time::timeout(relay.idle, relay.events.next()).await {
                Ok(Some(Ok(AgentEvent::Chunk(payload)))) if payload == DONE_SENTINEL => {
                    warn!("agent emitted the completion marker as output; abandoning stream");
                    let err = AgentError::Malformed(format!("chunk equal to {DONE_SENTINEL}"));
                    Some((Err(err.into()), None))
                }
                Ok(Some(Ok(AgentEvent::Chunk(payload)))) => {
                    Some((Ok(StreamEvent::Chunk(payload)), Some(relay)))
                }
                Ok(Some(Ok(AgentEvent::Done))) | Ok(None) => {
                    debug!("agent stream completed");
                    Some((Ok(StreamEvent::Done), None))
                }
                Ok(Some(Err(err))) => {
                    warn!("agent stream failed: {}", err);
                    Some((Err(err.into()), None))
                }
                Err(_) => {
                    warn!("no agent output for {:?}; abandoning stream", relay.idle);
                    Some((Err(AgentError::Timeout(relay.idle).into()), None))
                }
            }
        },
    ))
}
