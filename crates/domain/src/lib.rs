//! Shared domain types for VoxGate.
//!
//! The closed signal/response vocabulary that flows between I/O handlers,
//! agents, and the orchestrator, plus the error taxonomy and configuration
//! types used by every other crate.

pub mod config;
pub mod error;
pub mod response;
pub mod signal;
pub mod stream;

pub use error::{Error, Intervention, InterventionKind, Result};
pub use response::{Response, ResponseKind, RoutingDecision, ToolCall};
pub use signal::{AudioEncoding, Signal, SignalKind};

/// Free-form metadata attached to signals, responses, and sessions.
pub type Metadata = std::collections::HashMap<String, serde_json::Value>;

/// The meta-tool name the orchestrator intercepts for agent switching.
pub const TRANSFER_AGENT_TOOL: &str = "transfer_agent";
