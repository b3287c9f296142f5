use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use kilo_protocol::{BridgeInput, Mode};
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

use super::BridgeFile;
use crate::agent::{AgentError, AgentRunner};

pub const DEFAULT_BRIDGE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ProcessBridgeConfig {
    /// Program to run; the input file path is appended to `args`.
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Where bridge files are created (system temp dir when unset).
    pub temp_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for ProcessBridgeConfig {
    fn default() -> Self {
        Self {
            program: "kilo-bridge".to_string(),
            args: Vec::new(),
            working_dir: None,
            temp_dir: None,
            timeout: DEFAULT_BRIDGE_TIMEOUT,
        }
    }
}

/// Runs one blocking agent call in a separate process.
#[derive(Debug, Clone)]
pub struct ProcessBridge {
    config: ProcessBridgeConfig,
}

impl ProcessBridge {
    pub fn new(config: ProcessBridgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessBridgeConfig {
        &self.config
    }

    /// Write the input file, run the program, and decode its stdout.
    ///
    /// The file is removed once the process has exited, whatever the outcome.
    pub async fn call(&self, mode: Mode, input: Value) -> Result<Value, AgentError> {
        let program = &self.config.program;
        let file = BridgeFile::create(self.config.temp_dir.as_deref(), &BridgeInput { mode, input })
            .map_err(|err| AgentError::Failed(format!("failed to write bridge input: {err}")))?;

        let mut cmd = Command::new(program);
        cmd.args(&self.config.args)
            .arg(file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|err| {
            AgentError::Unavailable(format!("failed to spawn bridge '{program}': {err}"))
        })?;
        debug!(program = %program, input = %file.path().display(), %mode, "bridge started");

        let output = match tokio::time::timeout(self.config.timeout, child.wait_with_output()).await
        {
            Ok(result) => result
                .map_err(|err| AgentError::Failed(format!("bridge process failed: {err}")))?,
            Err(_) => {
                warn!(program = %program, "bridge timed out after {:?}", self.config.timeout);
                return Err(AgentError::Timeout(self.config.timeout));
            }
        };
        drop(file);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::Failed(format!(
                "bridge exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|err| AgentError::Malformed(format!("bridge output is not JSON: {err}")))
    }
}

#[async_trait]
impl AgentRunner for ProcessBridge {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn run(&self, mode: Mode, input: Value) -> Result<Value, AgentError> {
        self.call(mode, input).await
    }
}
