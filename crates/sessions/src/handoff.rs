use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Context carried across an agent switch for a warm transition.
///
/// Produced by [`SessionContext::prepare_handoff`](crate::SessionContext::prepare_handoff)
/// and consumed exactly once by the next agent's `on_enter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffData {
    pub source_agent: String,
    pub target_agent: String,
    pub last_user_turn: Option<String>,
    pub user_intent: Option<String>,
    pub user_name: Option<String>,
    pub greeting_completed: bool,
    #[serde(default)]
    pub scratchpad_snapshot: HashMap<String, serde_json::Value>,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl HandoffData {
    /// Render the injection block appended to the target agent's prompt.
    ///
    /// The block layout is relied upon by downstream prompt consumers;
    /// absent fields are omitted, and an envelope with nothing to say
    /// renders as the empty string.
    pub fn to_context_injection(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        if let Some(name) = &self.user_name {
            parts.push(format!("User Name: {name}"));
        }
        if let Some(intent) = &self.user_intent {
            parts.push(format!("Previous Intent: {intent}"));
        }
        if let Some(turn) = &self.last_user_turn {
            parts.push(format!("Last User Message: \"{turn}\""));
        }
        if self.greeting_completed {
            parts.push("Note: Greeting already completed. Do NOT re-greet the user.".into());
        }
        if let Some(reason) = &self.reason {
            parts.push(format!("Handoff Reason: {reason}"));
        }

        if parts.is_empty() {
            return String::new();
        }
        format!("[HANDOFF CONTEXT]\n{}\n[END CONTEXT]", parts.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> HandoffData {
        HandoffData {
            source_agent: "router".into(),
            target_agent: "task_manager".into(),
            last_user_turn: None,
            user_intent: None,
            user_name: None,
            greeting_completed: false,
            scratchpad_snapshot: HashMap::new(),
            reason: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn empty_envelope_renders_nothing() {
        assert_eq!(empty().to_context_injection(), "");
    }

    #[test]
    fn full_envelope_renders_all_fields_in_order() {
        let mut h = empty();
        h.user_name = Some("Alice Ng".into());
        h.user_intent = Some("add a task".into());
        h.last_user_turn = Some("add a task to call mum tomorrow.".into());
        h.greeting_completed = true;
        h.reason = Some("User wants to create a task".into());

        let block = h.to_context_injection();
        assert!(block.starts_with("[HANDOFF CONTEXT]\n"));
        assert!(block.ends_with("\n[END CONTEXT]"));
        assert!(block.contains("User Name: Alice Ng"));
        assert!(block.contains("Previous Intent: add a task"));
        assert!(block.contains("Last User Message: \"add a task to call mum tomorrow.\""));
        assert!(block.contains("Note: Greeting already completed. Do NOT re-greet the user."));
        assert!(block.contains("Handoff Reason: User wants to create a task"));

        // Name precedes intent precedes last message.
        let name_at = block.find("User Name").unwrap();
        let intent_at = block.find("Previous Intent").unwrap();
        let msg_at = block.find("Last User Message").unwrap();
        assert!(name_at < intent_at && intent_at < msg_at);
    }

    #[test]
    fn greeting_note_alone_is_enough() {
        let mut h = empty();
        h.greeting_completed = true;
        let block = h.to_context_injection();
        assert!(block.contains("Do NOT re-greet"));
        assert!(!block.contains("User Name:"));
    }
}
