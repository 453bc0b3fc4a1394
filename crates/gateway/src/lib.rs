//! The VoxGate gateway: HTTP/WebSocket façade, call-time orchestration,
//! and the carrier bridge pump.

pub mod api;
pub mod bridge;
pub mod cli;
pub mod runtime;
pub mod state;
