//! Plan, confirm, execute: an HTTP gateway in front of a coding agent.
//!
//! A client sends conversation history to `POST /plan` and gets back ordered
//! steps. Once the user confirms them, `POST /execute` runs the agent and
//! relays its output as a `text/event-stream`, ending with `data: [DONE]`.
//!
//! - [`agent`]: the Agent Invoker and its transports
//! - [`bridge`]: the one-shot process bridge (both ends)
//! - [`plan`]: the Plan Service
//! - [`relay`]: the Execution Relay
//! - [`api`]: the axum router
//! - [`client`]: a client for the router's contract
//! - [`config`]: layered configuration

pub mod agent;
pub mod api;
pub mod bridge;
pub mod client;
pub mod config;
pub mod plan;
pub mod relay;

pub use config::AppConfig;
