//! The gatekeeper.
//!
//! Owns the `create_user` tool. The prompt is rendered with the caller's
//! phone number from session metadata; on a successful account creation
//! the orchestrator installs the user and hands the call to the task
//! manager.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use vx_domain::{Response, Result, Signal};
use vx_providers::{ChatMessage, LiveClient};
use vx_sessions::{GlobalContext, HandoffData};
use vx_storage::StorageService;

use crate::agent::{Agent, AgentCore, ModelSettings, ResponseModality};
use crate::prompt::PromptStore;
use crate::tool::{Tool, ToolSet};

pub struct IdentityAgent {
    core: AgentCore,
    client: Arc<dyn LiveClient>,
    conversation: Mutex<Vec<ChatMessage>>,
}

impl IdentityAgent {
    pub fn new(
        client: Arc<dyn LiveClient>,
        storage: Arc<StorageService>,
        prompts: &PromptStore,
    ) -> Self {
        let tools = ToolSet::new(vec![Tool::new(
            "create_user",
            "Create an account for the caller. \
             Usage: create_user(phone_number='...', full_name='...')",
            json!({
                "type": "object",
                "properties": {
                    "phone_number": { "type": "string" },
                    "full_name": { "type": "string" },
                },
                "required": ["phone_number", "full_name"],
            }),
            move |_ctx, args| {
                let storage = storage.clone();
                Box::pin(async move { create_user(&storage, &args) })
            },
        )]);

        Self {
            core: AgentCore::new(
                "identity",
                prompts.load("identity"),
                ModelSettings {
                    temperature: 0.5,
                    modality: ResponseModality::Audio,
                    ..Default::default()
                },
                tools,
            ),
            client,
            conversation: Mutex::new(Vec::new()),
        }
    }
}

/// Tool body: normalize the phone number and persist the user.
fn create_user(storage: &StorageService, args: &Value) -> Result<Value> {
    let phone_raw = args
        .get("phone_number")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let full_name = args
        .get("full_name")
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    // Callers dictate numbers with pauses; strip the formatting.
    let phone: String = phone_raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-'))
        .collect();

    let (users, _) = storage.repositories();
    match users.create(&phone, Some(full_name.to_owned())) {
        Ok(user) => Ok(json!({
            "success": true,
            "user_id": user.user_id,
            "full_name": user.full_name,
            "phone_number": user.phone_number,
            "message": "Account created.",
        })),
        Err(e) => Ok(json!({ "success": false, "error": e.to_string() })),
    }
}

#[async_trait::async_trait]
impl Agent for IdentityAgent {
    fn name(&self) -> &str {
        &self.core.name
    }

    fn tools(&self) -> &ToolSet {
        &self.core.tools
    }

    fn model_settings(&self) -> &ModelSettings {
        &self.core.settings
    }

    fn render_prompt(&self, ctx: &GlobalContext) -> String {
        // The identity prompt additionally needs the caller's number.
        let phone = ctx
            .session
            .metadata
            .get("phone_number")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        self.core.render(ctx).replace("{{phone_number}}", phone)
    }

    async fn process_signal(&self, signal: &Signal, ctx: &mut GlobalContext) -> Result<Response> {
        self.core
            .process_via_model(&self.client, &self.conversation, signal, ctx)
            .await
    }

    async fn on_enter(&self, _ctx: &mut GlobalContext, handoff: Option<&HandoffData>) -> Result<()> {
        self.core.enter(handoff);
        Ok(())
    }

    async fn on_exit(&self, _ctx: &mut GlobalContext) -> Result<()> {
        self.core.exit();
        self.conversation.lock().clear();
        Ok(())
    }

    async fn handle_tool_result(
        &self,
        tool_name: &str,
        result: &Value,
        _ctx: &mut GlobalContext,
    ) -> Result<Option<Response>> {
        if tool_name == "create_user" && result.get("success") == Some(&Value::Bool(false)) {
            tracing::warn!(
                error = %result.get("error").and_then(|e| e.as_str()).unwrap_or("unknown"),
                "account creation failed"
            );
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolContext;
    use vx_providers::{GenerateRequest, GenerateResponse, LiveSession, ToolSchema};

    struct NullClient;

    #[async_trait::async_trait]
    impl LiveClient for NullClient {
        async fn open_session(
            &self,
            _system_prompt: &str,
            _tools: &[ToolSchema],
        ) -> Result<LiveSession> {
            unimplemented!("not used in identity tests")
        }

        async fn generate(&self, _req: GenerateRequest) -> Result<GenerateResponse> {
            Ok(GenerateResponse {
                text: Some("What is your name?".into()),
                tool_calls: Vec::new(),
            })
        }
    }

    fn agent_with_storage() -> (IdentityAgent, Arc<StorageService>) {
        let storage = Arc::new(StorageService::in_memory());
        let dir = tempfile::tempdir().unwrap();
        let agent = IdentityAgent::new(
            Arc::new(NullClient),
            storage.clone(),
            &PromptStore::new(dir.path()),
        );
        (agent, storage)
    }

    #[tokio::test]
    async fn create_user_normalizes_phone() {
        let (agent, storage) = agent_with_storage();
        let tool = agent.tools().get("create_user").unwrap();

        let result = tool
            .invoke(
                ToolContext::default(),
                json!({ "phone_number": "+1 555-010-0", "full_name": "Alice Ng" }),
            )
            .await
            .unwrap();

        assert_eq!(result["success"], json!(true));
        let (users, _) = storage.repositories();
        let user = users.get_by_phone("+15550100").unwrap().unwrap();
        assert_eq!(user.full_name.as_deref(), Some("Alice Ng"));
    }

    #[tokio::test]
    async fn duplicate_phone_reports_failure_not_error() {
        let (agent, _storage) = agent_with_storage();
        let tool = agent.tools().get("create_user").unwrap();
        let args = json!({ "phone_number": "+15550100", "full_name": "Alice Ng" });

        tool.invoke(ToolContext::default(), args.clone()).await.unwrap();
        let second = tool.invoke(ToolContext::default(), args).await.unwrap();
        assert_eq!(second["success"], json!(false));
    }

    #[test]
    fn prompt_renders_phone_from_session_metadata() {
        let (agent, _) = agent_with_storage();
        let mut ctx = GlobalContext::new("test");
        ctx.session
            .metadata
            .insert("phone_number".into(), json!("+15550123"));
        let prompt = agent.render_prompt(&ctx);
        assert!(prompt.contains("+15550123"));
        assert!(!prompt.contains("{{phone_number}}"));
    }
}
