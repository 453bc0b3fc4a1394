use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Metadata;

/// A tool invocation requested by an agent or the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    pub arguments: serde_json::Value,
    /// Unique per call site; echoed back on the tool result.
    pub call_id: String,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            call_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = call_id.into();
        self
    }

    /// String argument by name, if present.
    pub fn str_arg(&self, name: &str) -> Option<&str> {
        self.arguments.get(name).and_then(|v| v.as_str())
    }
}

/// A routing decision produced by the receptionist agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub thought_process: String,
    pub route_to: String,
    #[serde(default)]
    pub handover_context: Option<String>,
    #[serde(default)]
    pub priority: i32,
}

/// Payload of a [`Response`] (closed set).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseKind {
    Audio {
        #[serde(skip)]
        audio_data: Vec<u8>,
    },
    Text {
        content: String,
    },
    ToolCall {
        calls: Vec<ToolCall>,
    },
    Routing {
        decision: RoutingDecision,
    },
    Error {
        message: String,
    },
}

/// An agent's output for one processed signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub agent_name: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub requires_tool_execution: bool,
    pub is_final: bool,
    #[serde(flatten)]
    pub kind: ResponseKind,
}

impl Response {
    fn new(
        session_id: impl Into<String>,
        agent_name: impl Into<String>,
        kind: ResponseKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            session_id: session_id.into(),
            agent_name: agent_name.into(),
            metadata: Metadata::new(),
            requires_tool_execution: false,
            is_final: true,
            kind,
        }
    }

    pub fn text(
        session_id: impl Into<String>,
        agent_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(
            session_id,
            agent_name,
            ResponseKind::Text {
                content: content.into(),
            },
        )
    }

    pub fn audio(
        session_id: impl Into<String>,
        agent_name: impl Into<String>,
        audio_data: Vec<u8>,
    ) -> Self {
        Self::new(session_id, agent_name, ResponseKind::Audio { audio_data })
    }

    pub fn tool_calls(
        session_id: impl Into<String>,
        agent_name: impl Into<String>,
        calls: Vec<ToolCall>,
    ) -> Self {
        let mut r = Self::new(session_id, agent_name, ResponseKind::ToolCall { calls });
        r.requires_tool_execution = true;
        r.is_final = false;
        r
    }

    pub fn routing(
        session_id: impl Into<String>,
        agent_name: impl Into<String>,
        decision: RoutingDecision,
    ) -> Self {
        let mut r = Self::new(session_id, agent_name, ResponseKind::Routing { decision });
        r.is_final = false;
        r
    }

    pub fn error(
        session_id: impl Into<String>,
        agent_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            session_id,
            agent_name,
            ResponseKind::Error {
                message: message.into(),
            },
        )
    }

    pub fn text_content(&self) -> Option<&str> {
        match &self.kind {
            ResponseKind::Text { content } => Some(content.as_str()),
            _ => None,
        }
    }

    pub fn audio_data(&self) -> Option<&[u8]> {
        match &self.kind {
            ResponseKind::Audio { audio_data } if !audio_data.is_empty() => {
                Some(audio_data.as_slice())
            }
            _ => None,
        }
    }

    pub fn calls(&self) -> &[ToolCall] {
        match &self.kind {
            ResponseKind::ToolCall { calls } => calls.as_slice(),
            _ => &[],
        }
    }

    pub fn routing_decision(&self) -> Option<&RoutingDecision> {
        match &self.kind {
            ResponseKind::Routing { decision } => Some(decision),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_response_requires_execution() {
        let r = Response::tool_calls(
            "s1",
            "task_manager",
            vec![ToolCall::new("create_task", serde_json::json!({"description": "x"}))],
        );
        assert!(r.requires_tool_execution);
        assert!(!r.is_final);
        assert_eq!(r.calls().len(), 1);
        assert_eq!(r.calls()[0].str_arg("description"), Some("x"));
    }

    #[test]
    fn text_response_is_final() {
        let r = Response::text("s1", "identity", "hello");
        assert!(r.is_final);
        assert!(!r.requires_tool_execution);
        assert_eq!(r.text_content(), Some("hello"));
        assert!(r.audio_data().is_none());
    }

    #[test]
    fn routing_response_carries_decision() {
        let r = Response::routing(
            "s1",
            "router",
            RoutingDecision {
                thought_process: "task intent".into(),
                route_to: "task_manager".into(),
                handover_context: Some("add a task".into()),
                priority: 0,
            },
        );
        assert!(!r.is_final);
        assert_eq!(r.routing_decision().unwrap().route_to, "task_manager");
    }

    #[test]
    fn error_response_has_no_content_accessors() {
        let r = Response::error("s1", "system", "something broke");
        assert!(r.text_content().is_none());
        assert!(r.audio_data().is_none());
        assert!(r.calls().is_empty());
        match &r.kind {
            ResponseKind::Error { message } => assert_eq!(message, "something broke"),
            _ => panic!("expected error response"),
        }
    }

    #[test]
    fn call_ids_are_unique() {
        let a = ToolCall::new("t", serde_json::json!({}));
        let b = ToolCall::new("t", serde_json::json!({}));
        assert_ne!(a.call_id, b.call_id);
    }
}
