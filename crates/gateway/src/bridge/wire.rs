//! Carrier media-stream wire format.
//!
//! JSON events keyed by `event`. Inbound audio is base64 μ-law at 8 kHz;
//! outbound media must match. `mark` synchronizes playback; `clear`
//! aborts pending audio.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::json;

/// Inbound events from the carrier.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CarrierEvent {
    Connected,
    Start { start: StartMeta },
    Media { media: MediaPayload },
    Stop,
    Mark,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartMeta {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    #[serde(rename = "customParameters", default)]
    pub custom_parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaPayload {
    /// Base64 μ-law samples.
    pub payload: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl CarrierEvent {
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

// ── Outbound builders ──────────────────────────────────────────────

/// `media` frame carrying base64 μ-law audio.
pub fn media_event(stream_sid: &str, payload_b64: &str) -> String {
    json!({
        "event": "media",
        "streamSid": stream_sid,
        "media": { "payload": payload_b64 },
    })
    .to_string()
}

/// `mark` frame for output synchronization.
pub fn mark_event(stream_sid: &str, name: &str) -> String {
    json!({
        "event": "mark",
        "streamSid": stream_sid,
        "mark": { "name": name },
    })
    .to_string()
}

/// `clear` frame aborting pending playback.
pub fn clear_event(stream_sid: &str) -> String {
    json!({
        "event": "clear",
        "streamSid": stream_sid,
    })
    .to_string()
}
