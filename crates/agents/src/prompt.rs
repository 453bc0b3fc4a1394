//! Prompt loading and rendering.
//!
//! System prompts live in versioned files under the prompts directory
//! (`<agent>/v1_system.txt`), with built-in fallbacks so a fresh checkout
//! works without a resources tree. Templates use `{{key}}` placeholders.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::Mutex;

// ── Built-in fallbacks ─────────────────────────────────────────────

const ROUTER_PROMPT: &str = "\
You are the receptionist for a voice task assistant. Your only job is to \
route the caller to the right specialist by calling the transfer_agent \
tool. Route account or identity questions to 'identity' and everything \
task-related to 'task_manager'. Do not answer the request yourself. \
Current time: {{current_time}}. Caller authenticated: {{is_authenticated}}.";

const IDENTITY_PROMPT: &str = "\
You are the account assistant for a voice task service. The caller's \
phone number is {{phone_number}}. Greet them warmly, ask for their full \
name, then call create_user with the phone number and the name they give \
you. Keep every reply to one short spoken sentence.";

const TASK_MANAGER_PROMPT: &str = "\
You are a personal task assistant speaking with {{user_name}} over a \
voice call. Use the task tools to create, find, update, and delete their \
tasks. Confirm actions briefly and naturally; never read out task ids. \
Priorities run 1 (highest) to 5 (lowest). Current time: {{current_time}}.";

/// Render `{{key}}` placeholders in a template.
pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = template.to_owned();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }
    out
}

/// Loads and caches versioned agent prompts from disk.
pub struct PromptStore {
    base_path: PathBuf,
    cache: Mutex<HashMap<String, String>>,
}

impl PromptStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The prompt template for an agent: the first matching file under
    /// the prompts directory, else the built-in fallback.
    pub fn load(&self, agent: &str) -> String {
        if let Some(cached) = self.cache.lock().get(agent) {
            return cached.clone();
        }

        let candidates = [
            self.base_path.join(agent).join("v1_system.txt"),
            self.base_path.join(agent).join("v1_master.txt"),
            self.base_path.join(format!("{agent}.txt")),
        ];
        for path in &candidates {
            if let Ok(content) = std::fs::read_to_string(path) {
                tracing::debug!(agent, path = %path.display(), "prompt loaded");
                self.cache.lock().insert(agent.to_owned(), content.clone());
                return content;
            }
        }

        let fallback = match agent {
            "router" => ROUTER_PROMPT,
            "identity" => IDENTITY_PROMPT,
            "task_manager" => TASK_MANAGER_PROMPT,
            _ => {
                tracing::warn!(agent, "no prompt found, using generic fallback");
                return format!("You are {agent}, a helpful voice assistant.");
            }
        };
        self.cache
            .lock()
            .insert(agent.to_owned(), fallback.to_owned());
        fallback.to_owned()
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_all_occurrences() {
        let vars = HashMap::from([
            ("user_name".to_string(), "Alice".to_string()),
            ("current_time".to_string(), "2026-08-01 12:00:00".to_string()),
        ]);
        let out = render("Hello {{user_name}}, again {{user_name}} at {{current_time}}.", &vars);
        assert_eq!(out, "Hello Alice, again Alice at 2026-08-01 12:00:00.");
    }

    #[test]
    fn render_leaves_unknown_placeholders() {
        let out = render("{{unknown}} stays", &HashMap::new());
        assert_eq!(out, "{{unknown}} stays");
    }

    #[test]
    fn load_prefers_file_over_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("router")).unwrap();
        std::fs::write(dir.path().join("router/v1_system.txt"), "file prompt").unwrap();

        let store = PromptStore::new(dir.path());
        assert_eq!(store.load("router"), "file prompt");
        // Cached on second access even if the file vanishes.
        std::fs::remove_file(dir.path().join("router/v1_system.txt")).unwrap();
        assert_eq!(store.load("router"), "file prompt");
        // Clearing the cache falls back to the built-in prompt.
        store.clear_cache();
        assert_ne!(store.load("router"), "file prompt");
    }

    #[test]
    fn load_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let store = PromptStore::new(dir.path());
        assert!(store.load("identity").contains("{{phone_number}}"));
        assert!(store.load("someone_else").contains("someone_else"));
    }
}
