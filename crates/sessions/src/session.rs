use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vx_domain::Metadata;

use crate::handoff::HandoffData;
use crate::scratchpad::Scratchpad;

/// Where the call is coming from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Telephony,
    Web,
    Cli,
    Test,
}

/// Speaker role for a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

/// One turn in the append-only conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub turn_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub role: TurnRole,
    pub content: String,
    pub agent_name: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Per-call conversational state.
///
/// Invariants:
/// - `history` is append-only with non-decreasing timestamps;
/// - `active_agent` always names a registered agent;
/// - `greeting_completed` latches true and never resets;
/// - `handoff_data` is consumed at most once per prepared handoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub platform: Platform,
    pub active_agent: String,
    pub previous_agent: Option<String>,
    pub history: Vec<ConversationTurn>,
    pub scratchpad: Scratchpad,
    #[serde(default)]
    pub metadata: Metadata,
    pub handoff_data: Option<HandoffData>,
    pub greeting_completed: bool,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>, platform: Platform) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            created_at: now,
            last_activity: now,
            platform,
            active_agent: "router".into(),
            previous_agent: None,
            history: Vec::new(),
            scratchpad: Scratchpad::default(),
            metadata: Metadata::new(),
            handoff_data: None,
            greeting_completed: false,
        }
    }

    /// Append a turn and bump the activity clock.
    pub fn add_turn(
        &mut self,
        role: TurnRole,
        content: impl Into<String>,
        agent_name: Option<String>,
    ) -> &ConversationTurn {
        self.history.push(ConversationTurn {
            turn_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            role,
            content: content.into(),
            agent_name,
            metadata: Metadata::new(),
        });
        self.last_activity = Utc::now();
        self.history.last().expect("turn just pushed")
    }

    /// The most recent turns, oldest first.
    pub fn recent_history(&self, limit: usize) -> &[ConversationTurn] {
        let start = self.history.len().saturating_sub(limit);
        &self.history[start..]
    }

    /// Content of the most recent user turn, if any.
    pub fn last_user_turn(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|t| t.role == TurnRole::User)
            .map(|t| t.content.as_str())
    }

    /// Record an agent switch.
    pub fn switch_agent(&mut self, new_agent: impl Into<String>) {
        self.previous_agent = Some(std::mem::replace(
            &mut self.active_agent,
            new_agent.into(),
        ));
        self.last_activity = Utc::now();
    }

    /// Build and stash a handoff envelope for the upcoming switch.
    ///
    /// The stored envelope is the single authority for the in-flight
    /// handoff; callers must not keep their own copy.
    pub fn prepare_handoff(
        &mut self,
        target_agent: impl Into<String>,
        reason: Option<String>,
        user_intent: Option<String>,
    ) -> HandoffData {
        let handoff = HandoffData {
            source_agent: self.active_agent.clone(),
            target_agent: target_agent.into(),
            last_user_turn: self.last_user_turn().map(str::to_owned),
            user_intent,
            user_name: None,
            greeting_completed: self.greeting_completed,
            scratchpad_snapshot: self.scratchpad.snapshot(),
            reason,
            timestamp: Utc::now(),
        };
        self.handoff_data = Some(handoff.clone());
        handoff
    }

    /// Take the in-flight handoff, leaving the slot empty.
    pub fn consume_handoff(&mut self) -> Option<HandoffData> {
        self.handoff_data.take()
    }

    /// Latch the greeting flag. Once true it never resets.
    pub fn mark_greeting_completed(&mut self) {
        self.greeting_completed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_append_only_with_monotonic_timestamps() {
        let mut s = SessionContext::new("s1", Platform::Test);
        s.add_turn(TurnRole::User, "hello", None);
        s.add_turn(TurnRole::Assistant, "hi there", Some("identity".into()));
        s.add_turn(TurnRole::User, "create a task", None);

        assert_eq!(s.history.len(), 3);
        for pair in s.history.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[test]
    fn recent_history_returns_tail() {
        let mut s = SessionContext::new("s1", Platform::Test);
        for i in 0..5 {
            s.add_turn(TurnRole::User, format!("turn {i}"), None);
        }
        let recent = s.recent_history(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "turn 3");
        assert_eq!(recent[1].content, "turn 4");
        assert_eq!(s.recent_history(100).len(), 5);
    }

    #[test]
    fn last_user_turn_skips_assistant_turns() {
        let mut s = SessionContext::new("s1", Platform::Test);
        assert!(s.last_user_turn().is_none());
        s.add_turn(TurnRole::User, "first", None);
        s.add_turn(TurnRole::Assistant, "reply", Some("router".into()));
        assert_eq!(s.last_user_turn(), Some("first"));
        s.add_turn(TurnRole::User, "second", None);
        assert_eq!(s.last_user_turn(), Some("second"));
    }

    #[test]
    fn switch_agent_tracks_previous() {
        let mut s = SessionContext::new("s1", Platform::Test);
        assert_eq!(s.active_agent, "router");
        s.switch_agent("identity");
        assert_eq!(s.active_agent, "identity");
        assert_eq!(s.previous_agent.as_deref(), Some("router"));
        s.switch_agent("task_manager");
        assert_eq!(s.previous_agent.as_deref(), Some("identity"));
    }

    #[test]
    fn handoff_is_consumed_exactly_once() {
        let mut s = SessionContext::new("s1", Platform::Test);
        s.add_turn(TurnRole::User, "add a task to call mum tomorrow.", None);
        s.prepare_handoff(
            "task_manager",
            Some("User wants to create a task".into()),
            Some("add a task to call mum tomorrow.".into()),
        );

        let consumed = s.consume_handoff().expect("handoff present");
        assert_eq!(consumed.target_agent, "task_manager");
        assert_eq!(
            consumed.last_user_turn.as_deref(),
            Some("add a task to call mum tomorrow.")
        );
        assert!(s.consume_handoff().is_none());
    }

    #[test]
    fn handoff_snapshots_scratchpad_and_greeting() {
        let mut s = SessionContext::new("s1", Platform::Test);
        s.scratchpad.set("slot", serde_json::json!("x"));
        s.mark_greeting_completed();

        let h = s.prepare_handoff("identity", None, None);
        assert!(h.greeting_completed);
        assert_eq!(h.scratchpad_snapshot.get("slot").unwrap(), "x");
        assert_eq!(h.source_agent, "router");
    }

    #[test]
    fn greeting_latch_is_monotonic() {
        let mut s = SessionContext::new("s1", Platform::Test);
        assert!(!s.greeting_completed);
        s.mark_greeting_completed();
        s.mark_greeting_completed();
        assert!(s.greeting_completed);
    }
}
