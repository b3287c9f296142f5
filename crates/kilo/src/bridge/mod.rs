//! Process Bridge - one-shot agent calls across a process boundary.
//!
//! The caller writes `{mode, input}` to a fresh [`BridgeFile`], runs the
//! bridge program with the file's path as its last argument, and decodes the
//! single JSON document the program prints. The `kilo-bridge` binary is the
//! program side ([`cli::run_bridge`]).

pub mod cli;
mod file;
mod process;

pub use cli::{BridgeError, run_bridge};
pub use file::BridgeFile;
pub use process::{DEFAULT_BRIDGE_TIMEOUT, ProcessBridge, ProcessBridgeConfig};
