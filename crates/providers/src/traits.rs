use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use vx_domain::{Result, ToolCall};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool schema
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Function declaration advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: serde_json::Value,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Live session contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One model emission on the live channel.
///
/// Audio is 16-bit linear PCM at 24 kHz mono. A single event may carry
/// any combination of audio, text, and tool calls.
#[derive(Debug, Clone, Default)]
pub struct LiveEvent {
    pub text: Option<String>,
    pub audio_data: Option<Vec<u8>>,
    pub tool_calls: Vec<ToolCall>,
    /// The provider signalled end-of-turn. Does not end the session.
    pub turn_complete: bool,
}

impl LiveEvent {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.audio_data.is_none() && self.tool_calls.is_empty()
    }
}

/// Sending half of a live session.
///
/// Cloneable across tasks: the inbound pump streams audio while the
/// tool-result path replies to function calls on the same channel.
#[async_trait::async_trait]
pub trait LiveSender: Send + Sync {
    /// Forward a frame of 16 kHz PCM16 caller audio.
    ///
    /// Transient failures are logged by the implementation and do not
    /// tear down the session.
    async fn send_audio(&self, pcm16_16khz: Vec<u8>) -> Result<()>;

    /// Send a text turn (end-of-turn) to trigger a model response.
    async fn send_text(&self, text: &str) -> Result<()>;

    /// Reply to a function call by its `call_id`.
    async fn send_tool_response(&self, call_id: &str, result: serde_json::Value) -> Result<()>;

    /// Ask the session to stop; the event stream ends shortly after.
    fn stop(&self);
}

/// One live bidirectional session with the model.
///
/// The receiving half is a single-consumer event channel (only the
/// outbound pump reads it); the sender may be cloned freely.
pub struct LiveSession {
    pub sender: Arc<dyn LiveSender>,
    pub events: mpsc::Receiver<Result<LiveEvent>>,
}

impl LiveSession {
    /// Stop the session and drain the event channel.
    ///
    /// Dropping the sender lets the writer task close the socket, which
    /// unblocks the reader; the drain is bounded in case the transport
    /// never acknowledges the close.
    pub async fn close(self) {
        let LiveSession { sender, mut events } = self;
        sender.stop();
        drop(sender);
        let _ = tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while events.recv().await.is_some() {}
        })
        .await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Text generation (routing fallback)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A one-shot text completion request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSchema>,
    pub temperature: Option<f32>,
}

/// A one-shot text completion response.
#[derive(Debug, Clone, Default)]
pub struct GenerateResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The model-side contract the orchestrator and bridge are written
/// against. The live path is the only one exercised end-to-end; the
/// text path backs the router's fallback decision.
#[async_trait::async_trait]
pub trait LiveClient: Send + Sync {
    /// Open a long-lived bidirectional session seeded with a system
    /// prompt and the active agent's tool declarations.
    async fn open_session(
        &self,
        system_prompt: &str,
        tools: &[ToolSchema],
    ) -> Result<LiveSession>;

    /// One-shot text completion with optional tool declarations.
    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse>;
}
