use serde::{Deserialize, Serialize};

use vx_domain::Metadata;

/// User preferences for voice interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoicePreferences {
    pub voice_name: String,
    pub speaking_rate: f32,
    pub pitch: f32,
    pub language: String,
}

impl Default for VoicePreferences {
    fn default() -> Self {
        Self {
            voice_name: "Kore".into(),
            speaking_rate: 1.0,
            pitch: 0.0,
            language: "en-US".into(),
        }
    }
}

/// The caller, once identified.
///
/// [`UserContext::anonymous`] is the pre-authentication default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub phone_number: String,
    pub full_name: Option<String>,
    pub is_authenticated: bool,
    #[serde(default)]
    pub voice_preferences: VoicePreferences,
    #[serde(default)]
    pub metadata: Metadata,
}

impl UserContext {
    /// An unauthenticated placeholder user.
    pub fn anonymous() -> Self {
        Self {
            user_id: "anonymous".into(),
            phone_number: "unknown".into(),
            full_name: None,
            is_authenticated: false,
            voice_preferences: VoicePreferences::default(),
            metadata: Metadata::new(),
        }
    }

    /// An authenticated user.
    pub fn authenticated(
        user_id: impl Into<String>,
        phone_number: impl Into<String>,
        full_name: Option<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            phone_number: phone_number.into(),
            full_name,
            is_authenticated: true,
            voice_preferences: VoicePreferences::default(),
            metadata: Metadata::new(),
        }
    }

    /// Display name for prompts: the full name, or `"Guest"`.
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or("Guest")
    }
}
