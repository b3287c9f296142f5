//! Canonical protocol types for the kilo plan/execute relay.
//!
//! Every boundary in the system speaks one of the shapes defined here:
//!
//! ```text
//!   client ──HTTP/JSON──▶ gateway ──▶ plan service ─┐
//!     ▲                     │                       │
//!     │ text/event-stream   └──▶ execution relay ───┤
//!     │ (data: frames)                              ▼
//!     └──────────────────────────────────────── agent invoker
//!                                                   │
//!                      ┌────────────────────────────┼──────────────────┐
//!                      ▼                            ▼                  ▼
//!              HTTP agent service        bridge file + subprocess   stdio channel
//!              (/agent/run, /stream)     ({mode, input} JSON)       (length-prefixed)
//! ```
//!
//! - [`messages`]: request/response bodies (`ChatMessage`, `Mode`, `Plan`, ...)
//! - [`events`]: `StreamEvent` and the `data:` frame codec
//! - [`bridge`]: the bridge file document and stdio channel frames
//! - [`files`]: file-index request/response shapes

pub mod bridge;
pub mod error;
pub mod events;
pub mod files;
pub mod messages;

pub use bridge::{BridgeInput, ChannelFrame};
pub use error::ProtocolError;
pub use events::{DONE_SENTINEL, FrameDecoder, StreamEvent, encode_frame, extract_token};
pub use files::{FileIndex, FileIndexRequest, FileKind, IndexedFile};
pub use messages::{
    ChatMessage, ChatMeta, ChatRequest, ChatResponse, CustomRules, ExecutionRequest, Mode, Plan,
    PlanRequest, ProjectContext, Role,
};
