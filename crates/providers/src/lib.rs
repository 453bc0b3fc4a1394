//! LLM provider adapters for VoxGate.
//!
//! Defines the live-session contract the bridge pump and agents are
//! written against, plus the Gemini adapter implementing it over the
//! Live WebSocket API (audio in/out, function calls) with a REST
//! `generateContent` path for text-mode routing decisions.

pub mod gemini;
pub mod traits;

pub use gemini::GeminiLiveClient;
pub use traits::{
    ChatMessage, ChatRole, GenerateRequest, GenerateResponse, LiveClient, LiveEvent, LiveSender,
    LiveSession, ToolSchema,
};
