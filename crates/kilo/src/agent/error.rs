use std::time::Duration;

use kilo_protocol::ProtocolError;
use thiserror::Error;

/// Failures reaching or running the agent capability.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Transport failure before the agent could answer.
    #[error("agent backend unavailable: {0}")]
    Unavailable(String),

    /// The agent ran and reported failure.
    #[error("agent failed: {0}")]
    Failed(String),

    /// The agent answered with something that is not the agreed shape.
    #[error("agent returned malformed output: {0}")]
    Malformed(String),

    #[error("agent did not respond within {0:?}")]
    Timeout(Duration),

    /// The stream ended before the agent signaled completion.
    #[error("agent stream ended without a completion marker")]
    StreamInterrupted,
}

impl AgentError {
    /// Whether the client may simply try the same call again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentError::Unavailable(_) | AgentError::Timeout(_))
    }
}

impl From<ProtocolError> for AgentError {
    fn from(err: ProtocolError) -> Self {
        AgentError::Malformed(err.to_string())
    }
}
