use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use vx_domain::Metadata;

use crate::session::{Platform, SessionContext};
use crate::user::UserContext;

/// Application-wide context for one call.
///
/// Owned exclusively by the orchestrator; agents see it by reference.
/// Mutation is confined to session bookkeeping, handoff prepare/consume,
/// and authentication install/clear.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalContext {
    pub app_name: String,
    pub version: String,
    pub environment: String,
    pub current_time: DateTime<Utc>,
    pub session: SessionContext,
    pub user: UserContext,
    /// Registered agent names, in registration order.
    pub available_agents: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Default for GlobalContext {
    fn default() -> Self {
        Self::new("development")
    }
}

impl GlobalContext {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            app_name: "VoxGate".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            environment: environment.into(),
            current_time: Utc::now(),
            session: SessionContext::new(uuid::Uuid::new_v4().to_string(), Platform::Cli),
            user: UserContext::anonymous(),
            available_agents: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    pub fn refresh_time(&mut self) {
        self.current_time = Utc::now();
    }

    /// Install an authenticated user. A pending handoff picks up the name.
    pub fn set_user(&mut self, user: UserContext) {
        if let Some(handoff) = self.session.handoff_data.as_mut() {
            handoff.user_name = user.full_name.clone();
        }
        self.user = user;
    }

    /// Drop back to the anonymous user.
    pub fn clear_user(&mut self) {
        self.user = UserContext::anonymous();
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_authenticated
    }

    /// Variables exposed to `{{key}}` prompt templates.
    pub fn template_vars(&self) -> HashMap<String, String> {
        let platform = match self.session.platform {
            Platform::Telephony => "telephony",
            Platform::Web => "web",
            Platform::Cli => "cli",
            Platform::Test => "test",
        };
        HashMap::from([
            ("user_name".into(), self.user.display_name().to_owned()),
            (
                "current_time".into(),
                self.current_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            ),
            ("platform_source".into(), platform.to_owned()),
            ("session_id".into(), self.session.session_id.clone()),
            (
                "is_authenticated".into(),
                self.user.is_authenticated.to_string(),
            ),
            (
                "greeting_completed".into(),
                self.session.greeting_completed.to_string(),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_vars_default_to_guest() {
        let ctx = GlobalContext::new("test");
        let vars = ctx.template_vars();
        assert_eq!(vars["user_name"], "Guest");
        assert_eq!(vars["is_authenticated"], "false");
        assert_eq!(vars["platform_source"], "cli");
    }

    #[test]
    fn set_user_updates_pending_handoff_name() {
        let mut ctx = GlobalContext::new("test");
        ctx.session.prepare_handoff("task_manager", None, None);

        ctx.set_user(UserContext::authenticated(
            "u1",
            "+15550100",
            Some("Alice Ng".into()),
        ));

        let handoff = ctx.session.consume_handoff().unwrap();
        assert_eq!(handoff.user_name.as_deref(), Some("Alice Ng"));
        assert!(ctx.is_authenticated());
    }

    #[test]
    fn clear_user_resets_to_anonymous() {
        let mut ctx = GlobalContext::new("test");
        ctx.set_user(UserContext::authenticated("u1", "+1", None));
        assert!(ctx.is_authenticated());
        ctx.clear_user();
        assert!(!ctx.is_authenticated());
        assert_eq!(ctx.user.user_id, "anonymous");
    }
}
