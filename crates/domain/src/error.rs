use serde::{Deserialize, Serialize};

use crate::Metadata;

/// Why the observer forced a context switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InterventionKind {
    Hotword,
    Sentiment,
    Timeout,
    Emergency,
}

/// Raised by the intervention observer to preempt the active agent.
///
/// Caught at the event-loop boundary and translated into an agent switch
/// plus a short acknowledgement. Never fatal.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?} intervention: {message}")]
pub struct Intervention {
    pub kind: InterventionKind,
    pub message: String,
    /// Agent to route to, when the trigger implies one.
    pub target_agent: Option<String>,
    pub details: Metadata,
}

impl Intervention {
    pub fn new(kind: InterventionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            target_agent: None,
            details: Metadata::new(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_agent = Some(target.into());
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

/// Shared error type used across all VoxGate crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("WebSocket: {0}")]
    WebSocket(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error(transparent)]
    Intervention(#[from] Intervention),

    #[error("routing {source_agent} -> {target_agent}: {message}")]
    Routing {
        source_agent: String,
        target_agent: String,
        message: String,
    },

    #[error("agent {agent_name}: {message}")]
    Agent {
        agent_name: String,
        message: String,
        recoverable: bool,
    },

    #[error("tool {tool_name}: {message}")]
    ToolExecution {
        tool_name: String,
        arguments: serde_json::Value,
        message: String,
    },

    #[error("authentication required: {0}")]
    Authentication(String),

    #[error("session {session_id} expired")]
    SessionExpired { session_id: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("config: {0}")]
    Config(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn tool(
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
        message: impl Into<String>,
    ) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            arguments,
            message: message.into(),
        }
    }

    pub fn routing(
        source: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Routing {
            source_agent: source.into(),
            target_agent: target.into(),
            message: message.into(),
        }
    }

    pub fn agent(agent_name: impl Into<String>, message: impl Into<String>, recoverable: bool) -> Self {
        Self::Agent {
            agent_name: agent_name.into(),
            message: message.into(),
            recoverable,
        }
    }

    /// Whether the event loop may continue the call after this error.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Agent { recoverable, .. } => *recoverable,
            Error::SessionExpired { .. } => false,
            Error::Intervention(_)
            | Error::Routing { .. }
            | Error::ToolExecution { .. }
            | Error::Authentication(_) => true,
            _ => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intervention_builder() {
        let iv = Intervention::new(InterventionKind::Hotword, "Hotword detected: operator")
            .with_target("human_intervention")
            .with_detail("hotword", serde_json::json!("operator"));
        assert_eq!(iv.kind, InterventionKind::Hotword);
        assert_eq!(iv.target_agent.as_deref(), Some("human_intervention"));
    }

    #[test]
    fn unrecoverable_agent_error() {
        let e = Error::agent("task_manager", "boom", false);
        assert!(!e.is_recoverable());
        let e = Error::agent("task_manager", "blip", true);
        assert!(e.is_recoverable());
    }

    #[test]
    fn session_expired_is_fatal() {
        let e = Error::SessionExpired {
            session_id: "s1".into(),
        };
        assert!(!e.is_recoverable());
    }
}
