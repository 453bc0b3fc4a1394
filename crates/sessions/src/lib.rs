//! Call-scoped state for VoxGate.
//!
//! Hierarchical, mutable-but-owned context for a single call: the global
//! context owns the session, the session owns the conversation history,
//! scratchpad, and any in-flight handoff envelope. The orchestrator owns
//! the [`GlobalContext`] exclusively; agents receive it by reference for
//! read access and scoped mutation (history, scratchpad, handoff).

pub mod global;
pub mod handoff;
pub mod scratchpad;
pub mod session;
pub mod user;

pub use global::GlobalContext;
pub use handoff::HandoffData;
pub use scratchpad::Scratchpad;
pub use session::{ConversationTurn, Platform, SessionContext, TurnRole};
pub use user::{UserContext, VoicePreferences};
