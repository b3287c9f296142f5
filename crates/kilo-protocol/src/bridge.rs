//! Subprocess boundary documents.
//!
//! Two process-boundary protocols exist side by side:
//!
//! - the one-shot bridge file, a single JSON [`BridgeInput`] handed to the
//!   bridge program by path;
//! - the persistent stdio channel, a sequence of [`ChannelFrame`]s, each
//!   prefixed with a 4-byte big-endian length.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::messages::Mode;

/// Contents of a bridge input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeInput {
    pub mode: Mode,
    pub input: Value,
}

/// One message on the stdio channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelFrame {
    /// Gateway to agent, sent once per channel.
    Request { mode: Mode, input: Value },
    /// Incremental output.
    Chunk { payload: String },
    /// Agent finished successfully.
    Done,
    /// Agent failed; no further frames follow.
    Error { message: String },
}

impl ChannelFrame {
    pub fn to_bytes(&self) -> Result<Bytes, ProtocolError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bridge_input_shape() {
        let input: BridgeInput =
            serde_json::from_value(json!({"mode": "coder", "input": "add a test"})).unwrap();
        assert_eq!(input.mode, Mode::Coder);
        assert_eq!(input.input, json!("add a test"));
    }

    #[test]
    fn channel_frames_are_tagged() {
        let frame = ChannelFrame::Chunk {
            payload: "tok".into(),
        };
        let bytes = frame.to_bytes().unwrap();
        assert_eq!(
            serde_json::from_slice::<Value>(&bytes).unwrap(),
            json!({"type": "chunk", "payload": "tok"})
        );
        assert_eq!(ChannelFrame::from_bytes(br#"{"type":"done"}"#).unwrap(), ChannelFrame::Done);
        assert!(ChannelFrame::from_bytes(br#"{"type":"bogus"}"#).is_err());
    }
}
