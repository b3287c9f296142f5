//! Program side of the bridge: read the input file, run the agent, print.

use std::path::{Path, PathBuf};

use kilo_protocol::BridgeInput;
use log::debug;
use thiserror::Error;

use crate::agent::{AgentError, AgentRunner};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Missing input path")]
    MissingInput,

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed bridge input in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("failed to encode agent result: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Run one bridged call and return the pretty-printed result.
///
/// Nothing is returned unless the whole call succeeded, so the caller can
/// print the result verbatim and never emit partial output.
pub async fn run_bridge(
    input_path: Option<&Path>,
    agent: &dyn AgentRunner,
) -> Result<String, BridgeError> {
    let path = input_path.ok_or(BridgeError::MissingInput)?;
    let raw = tokio::fs::read(path).await.map_err(|source| BridgeError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let request: BridgeInput =
        serde_json::from_slice(&raw).map_err(|source| BridgeError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    debug!("running {} agent call via {}", request.mode, agent.name());
    let result = agent.run(request.mode, request.input).await?;
    serde_json::to_string_pretty(&result).map_err(BridgeError::Encode)
}
