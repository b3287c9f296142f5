//! Agent Invoker - one call into the agent capability.
//!
//! The agent is reached through two narrow traits so blocking and streaming
//! calls can use different transports:
//!
//! ```text
//!                       ┌──────────────────┐
//!                       │   AgentInvoker   │  timeouts, logging
//!                       └───┬──────────┬───┘
//!             AgentRunner   │          │   AgentStreamer
//!          ┌────────────────┤          ├────────────────────┐
//!          ▼                ▼          ▼                    ▼
//!   ┌─────────────┐  ┌─────────────┐        ┌──────────────────────┐
//!   │  HttpAgent  │  │ProcessBridge│        │     StdioAgent       │
//!   │ /agent/run  │  │ file + exec │        │ length-prefixed pipe │
//!   │ /agent/stream│ └─────────────┘        └──────────────────────┘
//!   └─────────────┘
//! ```
//!
//! The one-shot bridge cannot carry partial output, so it only implements
//! [`AgentRunner`].

mod channel;
mod error;
mod http;
mod invoker;

pub use channel::{StdioAgent, StdioAgentConfig, channel_events};
pub use error::AgentError;
pub use http::{HttpAgent, sse_events};
pub use invoker::{AgentInvoker, DEFAULT_AGENT_TIMEOUT};

use std::pin::Pin;

use async_trait::async_trait;
use kilo_protocol::Mode;
use serde_json::Value;
use tokio_stream::Stream;

/// One event produced by a streaming agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    Chunk(String),
    /// The agent signaled completion.
    Done,
}

/// Stream of agent events. Dropping it releases the underlying transport.
pub type AgentEventStream = Pin<Box<dyn Stream<Item = Result<AgentEvent, AgentError>> + Send>>;

/// Blocking form: one request, one terminal JSON result.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Short transport name used in logs and health output.
    fn name(&self) -> &'static str;

    async fn run(&self, mode: Mode, input: Value) -> Result<Value, AgentError>;
}

/// Streaming form: events as the agent produces them.
#[async_trait]
pub trait AgentStreamer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Open the stream. The first event may arrive much later.
    async fn run_stream(&self, mode: Mode, input: Value) -> Result<AgentEventStream, AgentError>;
}
