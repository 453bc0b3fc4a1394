use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub observer: ObserverConfig,
}

/// How severe a config validation finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

/// One validation finding.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Config {
    /// Load a TOML config file. A missing file yields the defaults.
    pub fn load(path: &std::path::Path) -> crate::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Resolve the LLM API key: config value, falling back to the
    /// `GOOGLE_API_KEY` environment variable.
    pub fn api_key(&self) -> Option<String> {
        self.llm
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
    }

    /// Validate the configuration, returning findings sorted by severity.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.api_key().is_none() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "no LLM API key: set [llm] api_key or GOOGLE_API_KEY".into(),
            });
        }
        if self.server.port == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "[server] port must be non-zero".into(),
            });
        }
        if self.observer.timeout_secs < 5 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: format!(
                    "[observer] timeout_secs = {} is aggressive; callers will be interrupted often",
                    self.observer.timeout_secs
                ),
            });
        }
        if self.llm.temperature < 0.0 || self.llm.temperature > 2.0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: format!("[llm] temperature {} outside [0, 2]", self.llm.temperature),
            });
        }

        issues
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sections
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "d_app_name")]
    pub name: String,
    #[serde(default = "d_environment")]
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: d_app_name(),
            environment: d_environment(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    /// Externally visible host for the carrier stream URL (behind a proxy
    /// this differs from the bind host). `None` = derive from the request.
    #[serde(default)]
    pub public_host: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            public_host: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key. Usually left empty and supplied via `GOOGLE_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "d_model")]
    pub model: String,
    #[serde(default = "d_voice")]
    pub voice: String,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    #[serde(default = "d_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "d_language")]
    pub language: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: d_model(),
            voice: d_voice(),
            temperature: d_temperature(),
            max_output_tokens: d_max_output_tokens(),
            language: d_language(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `users.json` / `tasks.json`.
    #[serde(default = "d_data_path")]
    pub data_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_path: d_data_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// Directory holding `<agent>/v1_system.txt` prompt files.
    #[serde(default = "d_prompts_path")]
    pub path: PathBuf,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            path: d_prompts_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverConfig {
    /// Phrases that trigger an immediate intervention.
    #[serde(default = "d_hotwords")]
    pub hotwords: Vec<String>,
    /// Inactivity timeout before the observer hands the call back to the
    /// router.
    #[serde(default = "d_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub enable_sentiment: bool,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            hotwords: d_hotwords(),
            timeout_secs: d_timeout_secs(),
            enable_sentiment: false,
        }
    }
}

// ── serde default helpers ──────────────────────────────────────────

fn d_app_name() -> String {
    "VoxGate".into()
}
fn d_environment() -> String {
    "development".into()
}
fn d_host() -> String {
    "0.0.0.0".into()
}
fn d_port() -> u16 {
    8080
}
fn d_model() -> String {
    "gemini-2.0-flash-exp".into()
}
fn d_voice() -> String {
    "Kore".into()
}
fn d_temperature() -> f32 {
    0.7
}
fn d_max_output_tokens() -> u32 {
    8_192
}
fn d_language() -> String {
    "en-US".into()
}
fn d_data_path() -> PathBuf {
    PathBuf::from("./data")
}
fn d_prompts_path() -> PathBuf {
    PathBuf::from("./resources/prompts")
}
fn d_hotwords() -> Vec<String> {
    [
        "stop",
        "cancel",
        "operator",
        "help",
        "emergency",
        "nevermind",
        "never mind",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn d_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.llm.voice, "Kore");
        assert_eq!(cfg.observer.timeout_secs, 30);
        assert!(cfg.observer.hotwords.iter().any(|h| h == "operator"));
        assert!(!cfg.observer.enable_sentiment);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [server]
            port = 9090

            [observer]
            timeout_secs = 45
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.observer.timeout_secs, 45);
        assert_eq!(cfg.llm.model, "gemini-2.0-flash-exp");
    }

    #[test]
    fn validate_flags_missing_api_key() {
        let cfg = Config::default();
        // Only meaningful when the env var is absent; skip otherwise.
        if std::env::var("GOOGLE_API_KEY").is_err() {
            let issues = cfg.validate();
            assert!(issues
                .iter()
                .any(|i| i.severity == ConfigSeverity::Error && i.message.contains("API key")));
        }
    }

    #[test]
    fn validate_warns_on_aggressive_timeout() {
        let cfg: Config = toml::from_str("[observer]\ntimeout_secs = 2\n").unwrap();
        assert!(cfg
            .validate()
            .iter()
            .any(|i| i.severity == ConfigSeverity::Warning && i.message.contains("aggressive")));
    }
}
