//! HTTP/WebSocket façade.

pub mod router;
pub mod voice;
pub mod ws;

pub use router::build_router;
