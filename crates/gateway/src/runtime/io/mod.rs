//! I/O handler abstraction.
//!
//! Handlers own the transport between the caller and the agents: a
//! finite stream of inbound signals, an outbound response sink, and the
//! filler machinery that masks routing and tool latency with short
//! interruptible utterances.

pub mod carrier;
pub mod cli;
pub mod ws;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use vx_domain::stream::BoxStream;
use vx_domain::{Response, Result, Signal};

pub use carrier::CarrierMediaHandler;
pub use cli::CliHandler;
pub use ws::BrowserWsHandler;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Filler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Kinds of latency-masking utterances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FillerType {
    Routing,
    ToolExecution,
    Thinking,
    Creating,
    Searching,
}

impl FillerType {
    pub fn as_str(self) -> &'static str {
        match self {
            FillerType::Routing => "routing",
            FillerType::ToolExecution => "tool_execution",
            FillerType::Thinking => "thinking",
            FillerType::Creating => "creating",
            FillerType::Searching => "searching",
        }
    }

    /// The filler matching a slow tool, by naming convention.
    pub fn for_tool(tool_name: &str) -> Self {
        if tool_name.contains("create") || tool_name.contains("add") {
            return FillerType::Creating;
        }
        if tool_name.contains("search") || tool_name.contains("get") || tool_name.contains("list")
        {
            return FillerType::Searching;
        }
        FillerType::ToolExecution
    }

    fn phrases(self) -> &'static [&'static str] {
        match self {
            FillerType::Routing => &["One moment please.", "Just a moment.", "Let me connect you."],
            FillerType::ToolExecution => &[
                "Let me check on that.",
                "One second while I look that up.",
                "Checking now.",
            ],
            FillerType::Thinking => &["Let me think about that.", "Hmm, good question."],
            FillerType::Creating => &[
                "Let me add that for you.",
                "Creating that now.",
                "Adding that to your list.",
            ],
            FillerType::Searching => &[
                "Looking that up for you.",
                "Searching now.",
                "Let me find that.",
            ],
        }
    }
}

/// Per-handler filler bookkeeping: at most one active filler, idempotent
/// cancellation, and deterministic phrase rotation.
#[derive(Default)]
pub struct FillerState {
    active: Mutex<Option<FillerType>>,
    cancelled: AtomicBool,
    phrase_seq: AtomicUsize,
}

impl FillerState {
    /// Start a filler, cancelling any prior one. Returns the phrase to
    /// speak.
    pub fn begin(&self, filler: FillerType) -> &'static str {
        let mut active = self.active.lock();
        *active = Some(filler);
        self.cancelled.store(false, Ordering::Release);

        let phrases = filler.phrases();
        let n = self.phrase_seq.fetch_add(1, Ordering::Relaxed);
        phrases[n % phrases.len()]
    }

    /// Cancel the active filler, if any. Safe to call repeatedly.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        *self.active.lock() = None;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn active(&self) -> Option<FillerType> {
        *self.active.lock()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Streaming input/output between a caller and the agents.
#[async_trait::async_trait]
pub trait IoHandler: Send + Sync {
    fn session_id(&self) -> &str;

    fn filler(&self) -> &FillerState;

    /// Inbound signals. Finite: ends on EOF or explicit close.
    fn stream_input(&self) -> BoxStream<'_, Signal>;

    /// Send a response to the caller.
    async fn stream_output(&self, response: &Response) -> Result<()>;

    /// Close the handler and release the transport.
    async fn close(&self) -> Result<()>;

    /// Abort pending playback, where the transport supports it.
    async fn clear_audio(&self) -> Result<()> {
        Ok(())
    }

    /// Deliver a filler phrase. The default speaks it as text; the
    /// carrier handler overrides this with a transport-side marker.
    async fn deliver_filler(&self, phrase: &str, agent_name: &str) -> Result<()> {
        self.send_text(phrase, agent_name).await
    }

    /// Start a latency-masking filler. Interruptible and exclusive: a
    /// new filler replaces any active one.
    async fn send_filler(&self, filler: FillerType, agent_name: &str) -> Result<()> {
        let phrase = self.filler().begin(filler);
        tracing::debug!(filler = filler.as_str(), phrase, "sending filler");
        self.deliver_filler(phrase, agent_name).await
    }

    /// Cancel any active filler. Idempotent.
    async fn cancel_filler(&self) {
        self.filler().cancel();
    }

    fn is_filler_cancelled(&self) -> bool {
        self.filler().is_cancelled()
    }

    /// Convenience: send a text response.
    async fn send_text(&self, content: &str, agent_name: &str) -> Result<()> {
        let response = Response::text(self.session_id().to_owned(), agent_name, content);
        self.stream_output(&response).await
    }

    /// Convenience: send an audio response.
    async fn send_audio(&self, audio_data: Vec<u8>, agent_name: &str) -> Result<()> {
        let response = Response::audio(self.session_id().to_owned(), agent_name, audio_data);
        self.stream_output(&response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filler_for_tool_naming() {
        assert_eq!(FillerType::for_tool("create_task"), FillerType::Creating);
        assert_eq!(FillerType::for_tool("add_item"), FillerType::Creating);
        assert_eq!(FillerType::for_tool("search_tasks"), FillerType::Searching);
        assert_eq!(FillerType::for_tool("get_todays_tasks"), FillerType::Searching);
        assert_eq!(FillerType::for_tool("delete_task"), FillerType::ToolExecution);
    }

    #[test]
    fn filler_state_new_replaces_old() {
        let state = FillerState::default();
        assert!(state.active().is_none());

        state.begin(FillerType::Routing);
        assert_eq!(state.active(), Some(FillerType::Routing));
        assert!(!state.is_cancelled());

        state.begin(FillerType::Searching);
        assert_eq!(state.active(), Some(FillerType::Searching));
    }

    #[test]
    fn cancel_is_idempotent() {
        let state = FillerState::default();
        state.begin(FillerType::Thinking);
        state.cancel();
        state.cancel();
        state.cancel();
        assert!(state.active().is_none());
        assert!(state.is_cancelled());
    }

    #[test]
    fn phrases_rotate_deterministically() {
        let state = FillerState::default();
        let a = state.begin(FillerType::Routing);
        let b = state.begin(FillerType::Routing);
        let c = state.begin(FillerType::Routing);
        let d = state.begin(FillerType::Routing);
        assert_eq!(a, "One moment please.");
        assert_eq!(b, "Just a moment.");
        assert_eq!(c, "Let me connect you.");
        assert_eq!(d, a);
    }
}
