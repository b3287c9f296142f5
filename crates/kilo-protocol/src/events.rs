//! Stream events and their `text/event-stream` framing.
//!
//! Each event travels as one frame: one `data: <line>` line per payload line,
//! then a blank line. Completion is a frame whose payload is [`DONE_SENTINEL`].

use serde_json::Value;

/// Payload of the frame that marks successful completion.
pub const DONE_SENTINEL: &str = "[DONE]";

const DATA_FIELD: &str = "data";

/// One unit relayed from the agent to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental token or log output.
    Chunk(String),
    /// Completion marker.
    Done,
}

impl StreamEvent {
    pub fn chunk(payload: impl Into<String>) -> Self {
        StreamEvent::Chunk(payload.into())
    }

    pub fn payload(&self) -> &str {
        match self {
            StreamEvent::Chunk(payload) => payload,
            StreamEvent::Done => DONE_SENTINEL,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, StreamEvent::Done)
    }

    fn from_payload(payload: String) -> Self {
        if payload == DONE_SENTINEL {
            StreamEvent::Done
        } else {
            StreamEvent::Chunk(payload)
        }
    }
}

/// Encode one event as a complete frame.
pub fn encode_frame(event: &StreamEvent) -> String {
    let payload = event.payload();
    let mut frame = String::with_capacity(payload.len() + 8);
    let normalized = payload.replace("\r\n", "\n").replace('\r', "\n");
    for line in normalized.split('\n') {
        frame.push_str(DATA_FIELD);
        frame.push_str(": ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');
    frame
}

/// Incremental frame decoder for `text/event-stream` bodies.
///
/// Bytes can be pushed in arbitrarily sized pieces; events are returned as
/// soon as their terminating blank line has been seen. Fields other than
/// `data` and comment lines are ignored. An unterminated frame at end of
/// input is never returned.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    line: Vec<u8>,
    data: Vec<String>,
    saw_data: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and collect every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for &byte in bytes {
            if byte != b'\n' {
                self.line.push(byte);
                continue;
            }
            if self.line.last() == Some(&b'\r') {
                self.line.pop();
            }
            let line = String::from_utf8_lossy(&self.line).into_owned();
            self.line.clear();
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// True when a frame has started but not been terminated yet.
    pub fn has_partial_frame(&self) -> bool {
        self.saw_data || !self.line.is_empty()
    }

    fn process_line(&mut self, line: &str) -> Option<StreamEvent> {
        if line.is_empty() {
            if !self.saw_data {
                return None;
            }
            let payload = self.data.join("\n");
            self.data.clear();
            self.saw_data = false;
            return Some(StreamEvent::from_payload(payload));
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == DATA_FIELD {
            self.data.push(value.to_string());
            self.saw_data = true;
        }
        None
    }
}

/// Pull the text token out of an agent chunk.
///
/// Agents may emit JSON objects carrying `delta` or `content` text; anything
/// else is relayed as-is.
pub fn extract_token(raw: &str) -> String {
    let trimmed = raw.trim_start();
    if !trimmed.starts_with('{') {
        return raw.to_string();
    }
    let Ok(Value::Object(object)) = serde_json::from_str::<Value>(trimmed) else {
        return raw.to_string();
    };
    ["delta", "content"]
        .iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .find(|text| !text.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| raw.to_string())
}
