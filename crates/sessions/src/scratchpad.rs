use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Mutable key→value storage for multi-turn slot filling.
///
/// Agents stash partial form data here between turns; the contents are
/// snapshotted into handoff envelopes on agent switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scratchpad {
    data: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Scratchpad {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            data: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Scratchpad {
    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
        self.updated_at = Utc::now();
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    pub fn take(&mut self, key: &str) -> Option<serde_json::Value> {
        let value = self.data.remove(key);
        if value.is_some() {
            self.updated_at = Utc::now();
        }
        value
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.updated_at = Utc::now();
    }

    /// Copy of the current contents, for handoff snapshots.
    pub fn snapshot(&self) -> HashMap<String, serde_json::Value> {
        self.data.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_take() {
        let mut pad = Scratchpad::default();
        assert!(!pad.has("slot"));

        pad.set("slot", serde_json::json!("call mum"));
        assert!(pad.has("slot"));
        assert_eq!(pad.get("slot").unwrap(), "call mum");

        assert_eq!(pad.take("slot").unwrap(), "call mum");
        assert!(!pad.has("slot"));
        assert!(pad.take("slot").is_none());
    }

    #[test]
    fn snapshot_is_independent() {
        let mut pad = Scratchpad::default();
        pad.set("a", serde_json::json!(1));
        let snap = pad.snapshot();
        pad.clear();
        assert!(!pad.has("a"));
        assert_eq!(snap.get("a").unwrap(), 1);
    }
}
