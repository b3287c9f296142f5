//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use super::files::FileIndexClient;
use crate::agent::AgentInvoker;
use crate::plan::PlanService;
use crate::relay::ExecutionRelay;

/// Everything a request handler needs. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub invoker: Arc<AgentInvoker>,
    pub plans: PlanService,
    pub relay: ExecutionRelay,
    pub files: FileIndexClient,
}

impl AppState {
    pub fn new(invoker: AgentInvoker, files: FileIndexClient) -> Self {
        let invoker = Arc::new(invoker);
        Self {
            plans: PlanService::new(invoker.clone()),
            relay: ExecutionRelay::new(invoker.clone()),
            invoker,
            files,
        }
    }

    pub fn with_stream_idle_timeout(mut self, idle: Duration) -> Self {
        self.relay = self.relay.with_idle_timeout(idle);
        self
    }

    /// Transport label reported by `/health`.
    pub fn transport(&self) -> String {
        match self.invoker.transports() {
            (run, stream) if run == stream => run.to_string(),
            (run, stream) => format!("{run}+{stream}"),
        }
    }
}
