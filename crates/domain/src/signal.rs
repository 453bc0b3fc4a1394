use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Metadata;

/// Sample encoding of inbound audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AudioEncoding {
    /// 16-bit signed little-endian PCM.
    Linear16,
    /// 8-bit G.711 μ-law (telephony).
    Mulaw,
}

/// Payload of a [`Signal`] (closed set, matched at each processing stage).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalKind {
    Audio {
        #[serde(with = "b64_bytes")]
        audio_data: Vec<u8>,
        sample_rate: u32,
        channels: u16,
        encoding: AudioEncoding,
    },
    Text {
        content: String,
        language: String,
    },
    System {
        event_type: String,
        payload: serde_json::Value,
    },
}

/// An input event delivered to the active agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(flatten)]
    pub kind: SignalKind,
}

impl Signal {
    fn new(session_id: impl Into<String>, kind: SignalKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            session_id: session_id.into(),
            metadata: Metadata::new(),
            kind,
        }
    }

    /// A text signal in the default language.
    pub fn text(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(
            session_id,
            SignalKind::Text {
                content: content.into(),
                language: "en-US".into(),
            },
        )
    }

    /// A linear-16 audio signal at the given sample rate.
    pub fn audio(session_id: impl Into<String>, audio_data: Vec<u8>, sample_rate: u32) -> Self {
        Self::new(
            session_id,
            SignalKind::Audio {
                audio_data,
                sample_rate,
                channels: 1,
                encoding: AudioEncoding::Linear16,
            },
        )
    }

    /// A μ-law audio signal (telephony, 8 kHz).
    pub fn mulaw_audio(session_id: impl Into<String>, audio_data: Vec<u8>) -> Self {
        Self::new(
            session_id,
            SignalKind::Audio {
                audio_data,
                sample_rate: 8_000,
                channels: 1,
                encoding: AudioEncoding::Mulaw,
            },
        )
    }

    /// A system event signal.
    pub fn system(
        session_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::new(
            session_id,
            SignalKind::System {
                event_type: event_type.into(),
                payload,
            },
        )
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Textual content carried by the signal: the text body, or a
    /// transcription attached to an audio signal by an upstream stage.
    pub fn text_content(&self) -> Option<&str> {
        match &self.kind {
            SignalKind::Text { content, .. } => Some(content.as_str()),
            SignalKind::Audio { .. } => self
                .metadata
                .get("transcription")
                .and_then(|v| v.as_str()),
            SignalKind::System { .. } => None,
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self.kind, SignalKind::Audio { .. })
    }
}

/// Base64 (de)serialization for raw sample buffers, so audio signals stay
/// representable in JSON transcripts.
mod b64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_signal_exposes_content() {
        let s = Signal::text("s1", "hello");
        assert_eq!(s.text_content(), Some("hello"));
        assert!(!s.is_audio());
        assert_eq!(s.session_id, "s1");
    }

    #[test]
    fn audio_signal_content_comes_from_transcription() {
        let s = Signal::audio("s1", vec![0, 1, 2], 16_000);
        assert_eq!(s.text_content(), None);

        let s = s.with_metadata("transcription", serde_json::json!("stop please"));
        assert_eq!(s.text_content(), Some("stop please"));
        assert!(s.is_audio());
    }

    #[test]
    fn mulaw_constructor_sets_telephony_defaults() {
        let s = Signal::mulaw_audio("s1", vec![0xff; 160]);
        match s.kind {
            SignalKind::Audio {
                sample_rate,
                channels,
                encoding,
                ..
            } => {
                assert_eq!(sample_rate, 8_000);
                assert_eq!(channels, 1);
                assert_eq!(encoding, AudioEncoding::Mulaw);
            }
            _ => panic!("expected audio signal"),
        }
    }

    #[test]
    fn system_signal_carries_event_payload() {
        let s = Signal::system(
            "s1",
            "session_start",
            serde_json::json!({ "platform": "telephony" }),
        );
        assert_eq!(s.text_content(), None);
        match s.kind {
            SignalKind::System { event_type, payload } => {
                assert_eq!(event_type, "session_start");
                assert_eq!(payload["platform"], "telephony");
            }
            _ => panic!("expected system signal"),
        }
    }

    #[test]
    fn audio_signal_round_trips_through_json() {
        let s = Signal::audio("s1", vec![1, 2, 3, 4, 5], 16_000);
        let json = serde_json::to_string(&s).unwrap();
        let back: Signal = serde_json::from_str(&json).unwrap();
        match back.kind {
            SignalKind::Audio { audio_data, .. } => assert_eq!(audio_data, vec![1, 2, 3, 4, 5]),
            _ => panic!("expected audio signal"),
        }
    }
}
