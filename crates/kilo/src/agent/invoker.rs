use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kilo_protocol::Mode;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::{AgentError, AgentEventStream, AgentRunner, AgentStreamer};

/// Default bound on a blocking call or on opening a stream.
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Single entry point for calls into the agent capability.
///
/// `mode` and `input` are forwarded verbatim; no history is kept here.
#[derive(Clone)]
pub struct AgentInvoker {
    runner: Arc<dyn AgentRunner>,
    streamer: Arc<dyn AgentStreamer>,
    timeout: Duration,
}

impl AgentInvoker {
    pub fn new(runner: Arc<dyn AgentRunner>, streamer: Arc<dyn AgentStreamer>) -> Self {
        Self {
            runner,
            streamer,
            timeout: DEFAULT_AGENT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Transport names as `(blocking, streaming)`.
    pub fn transports(&self) -> (&'static str, &'static str) {
        (self.runner.name(), self.streamer.name())
    }

    #[instrument(skip(self, input), fields(transport = self.runner.name()))]
    pub async fn invoke(&self, mode: Mode, input: Value) -> Result<Value, AgentError> {
        debug!("invoking agent");
        match tokio::time::timeout(self.timeout, self.runner.run(mode, input)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) => {
                warn!("agent call failed: {}", err);
                Err(err)
            }
            Err(_) => {
                warn!("agent call timed out after {:?}", self.timeout);
                Err(AgentError::Timeout(self.timeout))
            }
        }
    }

    /// Open a lazy event stream. Only opening is bounded by the timeout.
    #[instrument(skip(self, input), fields(transport = self.streamer.name()))]
    pub async fn invoke_stream(
        &self,
        mode: Mode,
        input: Value,
    ) -> Result<AgentEventStream, AgentError> {
        debug!("opening agent stream");
        match tokio::time::timeout(self.timeout, self.streamer.run_stream(mode, input)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(err)) => {
                warn!("failed to open agent stream: {}", err);
                Err(err)
            }
            Err(_) => {
                warn!("agent stream did not open within {:?}", self.timeout);
                Err(AgentError::Timeout(self.timeout))
            }
        }
    }
}

/// An invoker is itself a runner, so callers taking `&dyn AgentRunner` get
/// the timeout and logging too.
#[async_trait]
impl AgentRunner for AgentInvoker {
    fn name(&self) -> &'static str {
        self.runner.name()
    }

    async fn run(&self, mode: Mode, input: Value) -> Result<Value, AgentError> {
        self.invoke(mode, input).await
    }
}
