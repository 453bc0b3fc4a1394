//! The receptionist.
//!
//! Routes each caller turn to a specialist agent. Decision precedence:
//! unauthenticated callers go straight to `identity`; a keyword fast
//! path catches common task and identity phrasings without a model
//! round-trip; everything else falls back to the model with the
//! `transfer_agent` meta-tool.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use vx_domain::{Response, Result, RoutingDecision, Signal, TRANSFER_AGENT_TOOL};
use vx_sessions::{GlobalContext, HandoffData};
use vx_providers::{ChatMessage, GenerateRequest, LiveClient};

use crate::agent::{Agent, AgentCore, ModelSettings, ResponseModality};
use crate::prompt::PromptStore;
use crate::tool::{Tool, ToolSet};

/// Targets the router may transfer to.
const VALID_TARGETS: [&str; 3] = ["identity", "task_manager", "router"];

const TASK_KEYWORDS: [&str; 20] = [
    "task",
    "todo",
    "remind",
    "schedule",
    "add",
    "create",
    "list",
    "show",
    "what's on",
    "what do i have",
    "meeting",
    "appointment",
    "deadline",
    "priority",
    "due",
    "mark",
    "complete",
    "done",
    "finish",
    "delete",
];

const IDENTITY_KEYWORDS: [&str; 3] = ["who am i", "my name", "identify"];

pub struct RouterAgent {
    core: AgentCore,
    client: Arc<dyn LiveClient>,
    /// The router's own model conversation, reset on every activation
    /// (routing is stateless across visits).
    conversation: Mutex<Vec<ChatMessage>>,
}

impl RouterAgent {
    pub fn new(client: Arc<dyn LiveClient>, prompts: &PromptStore) -> Self {
        let tools = ToolSet::new(vec![Tool::new(
            TRANSFER_AGENT_TOOL,
            "Transfer the conversation to a specialized agent. Use this to route \
             the user to the appropriate agent based on their intent.",
            json!({
                "type": "object",
                "properties": {
                    "target_agent_name": {
                        "type": "string",
                        "description": "The name of the agent to transfer to",
                        "enum": ["identity", "task_manager"],
                    },
                    "reason": {
                        "type": "string",
                        "description": "Brief reason for the transfer",
                    },
                },
                "required": ["target_agent_name", "reason"],
            }),
            // Marker only: the orchestrator intercepts this call before
            // execution ever reaches the handler.
            |_ctx, args| Box::pin(async move { Ok(json!({ "action": "transfer", "args": args })) }),
        )]);

        Self {
            core: AgentCore::new(
                "router",
                prompts.load("router"),
                ModelSettings {
                    temperature: 0.3,
                    modality: ResponseModality::Text,
                    ..Default::default()
                },
                tools,
            ),
            client,
            conversation: Mutex::new(Vec::new()),
        }
    }

    /// Keyword fast path over the lowercased last user text.
    fn quick_route(&self, text: &str, ctx: &GlobalContext) -> Option<RoutingDecision> {
        for keyword in TASK_KEYWORDS {
            if text.contains(keyword) {
                return Some(RoutingDecision {
                    thought_process: format!("Detected task intent: '{keyword}'"),
                    route_to: "task_manager".into(),
                    handover_context: Some(text.to_owned()),
                    priority: 0,
                });
            }
        }
        for keyword in IDENTITY_KEYWORDS {
            if text.contains(keyword) {
                return Some(RoutingDecision {
                    thought_process: format!("User asking about identity: '{keyword}'"),
                    route_to: "identity".into(),
                    handover_context: None,
                    priority: 0,
                });
            }
        }
        if ctx.is_authenticated() {
            return Some(RoutingDecision {
                thought_process: "Authenticated user, defaulting to task manager".into(),
                route_to: "task_manager".into(),
                handover_context: Some(text.to_owned()),
                priority: 0,
            });
        }
        None
    }

    /// Model-backed routing via the `transfer_agent` meta-tool.
    async fn llm_route(&self, signal: &Signal, ctx: &GlobalContext) -> Response {
        let text = signal.text_content().unwrap_or("[audio input]").to_owned();
        let messages = {
            let mut conversation = self.conversation.lock();
            conversation.push(ChatMessage::user(&text));
            conversation.clone()
        };

        let req = GenerateRequest {
            system_prompt: self.core.render(ctx),
            messages,
            tools: self.core.tools.schemas(),
            temperature: Some(self.core.settings.temperature),
        };

        match self.client.generate(req).await {
            Ok(resp) => {
                for call in &resp.tool_calls {
                    if call.tool_name == TRANSFER_AGENT_TOOL {
                        let mut target = call
                            .str_arg("target_agent_name")
                            .unwrap_or("task_manager")
                            .to_owned();
                        if !VALID_TARGETS.contains(&target.as_str()) {
                            target = "task_manager".into();
                        }
                        let reason = call.str_arg("reason").unwrap_or_default().to_owned();
                        return Response::routing(
                            &signal.session_id,
                            &self.core.name,
                            RoutingDecision {
                                thought_process: reason,
                                route_to: target,
                                handover_context: Some(text),
                                priority: 0,
                            },
                        );
                    }
                }
                if let Some(reply) = resp.text {
                    return self.parse_text_routing(&reply, &signal.session_id);
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "router model call failed");
            }
        }

        Response::routing(
            &signal.session_id,
            &self.core.name,
            RoutingDecision {
                thought_process: "Fallback routing".into(),
                route_to: "task_manager".into(),
                handover_context: None,
                priority: 0,
            },
        )
    }

    /// Last-resort parse of a free-text model reply.
    fn parse_text_routing(&self, text: &str, session_id: &str) -> Response {
        let lower = text.to_lowercase();
        let target = if lower.contains("identity") || lower.contains("auth") {
            "identity"
        } else {
            "task_manager"
        };
        let mut excerpt = text.to_owned();
        excerpt.truncate(100);
        Response::routing(
            session_id,
            &self.core.name,
            RoutingDecision {
                thought_process: format!("Parsed from text: {excerpt}"),
                route_to: target.into(),
                handover_context: None,
                priority: 0,
            },
        )
    }
}

#[async_trait::async_trait]
impl Agent for RouterAgent {
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
        self.core.render(ctx)
    }

    async fn process_signal(&self, signal: &Signal, ctx: &mut GlobalContext) -> Result<Response> {
        if !ctx.is_authenticated() {
            tracing::info!("unauthenticated caller, routing to identity");
            return Ok(Response::routing(
                &signal.session_id,
                &self.core.name,
                RoutingDecision {
                    thought_process: "User is not authenticated".into(),
                    route_to: "identity".into(),
                    handover_context: Some("New session, authentication required".into()),
                    priority: 0,
                },
            ));
        }

        if let Some(text) = signal.text_content() {
            if let Some(decision) = self.quick_route(&text.to_lowercase(), ctx) {
                return Ok(Response::routing(&signal.session_id, &self.core.name, decision));
            }
        }

        Ok(self.llm_route(signal, ctx).await)
    }

    async fn on_enter(&self, _ctx: &mut GlobalContext, handoff: Option<&HandoffData>) -> Result<()> {
        self.core.enter(handoff);
        // Fresh decision every visit.
        self.conversation.lock().clear();
        Ok(())
    }

    async fn on_exit(&self, _ctx: &mut GlobalContext) -> Result<()> {
        self.core.exit();
        Ok(())
    }

    async fn handle_tool_result(
        &self,
        _tool_name: &str,
        _result: &Value,
        _ctx: &mut GlobalContext,
    ) -> Result<Option<Response>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vx_providers::{GenerateResponse, LiveSession, ToolSchema};
    use vx_sessions::UserContext;

    /// A client whose generate() is never supposed to run.
    struct PanicClient;

    #[async_trait::async_trait]
    impl LiveClient for PanicClient {
        async fn open_session(
            &self,
            _system_prompt: &str,
            _tools: &[ToolSchema],
        ) -> Result<LiveSession> {
            panic!("live session not expected in router tests");
        }

        async fn generate(&self, _req: GenerateRequest) -> Result<GenerateResponse> {
            panic!("keyword fast path should not reach the model");
        }
    }

    fn router() -> RouterAgent {
        let dir = tempfile::tempdir().unwrap();
        RouterAgent::new(Arc::new(PanicClient), &PromptStore::new(dir.path()))
    }

    fn authed_ctx() -> GlobalContext {
        let mut ctx = GlobalContext::new("test");
        ctx.set_user(UserContext::authenticated("u1", "+1", Some("Bob".into())));
        ctx
    }

    #[tokio::test]
    async fn unauthenticated_short_circuits_to_identity() {
        let mut ctx = GlobalContext::new("test");
        let resp = router()
            .process_signal(&Signal::text("s1", "hello there"), &mut ctx)
            .await
            .unwrap();
        assert_eq!(resp.routing_decision().unwrap().route_to, "identity");
    }

    #[tokio::test]
    async fn task_keyword_routes_to_task_manager_without_model() {
        let mut ctx = authed_ctx();
        let resp = router()
            .process_signal(
                &Signal::text("s1", "add a task to call mum tomorrow."),
                &mut ctx,
            )
            .await
            .unwrap();
        let decision = resp.routing_decision().unwrap();
        assert_eq!(decision.route_to, "task_manager");
        assert_eq!(
            decision.handover_context.as_deref(),
            Some("add a task to call mum tomorrow.")
        );
    }

    #[tokio::test]
    async fn identity_keyword_routes_to_identity() {
        let mut ctx = authed_ctx();
        let resp = router()
            .process_signal(&Signal::text("s1", "wait, who am I to you?"), &mut ctx)
            .await
            .unwrap();
        assert_eq!(resp.routing_decision().unwrap().route_to, "identity");
    }

    #[tokio::test]
    async fn authenticated_default_is_task_manager() {
        let mut ctx = authed_ctx();
        let resp = router()
            .process_signal(&Signal::text("s1", "hmm, interesting weather"), &mut ctx)
            .await
            .unwrap();
        assert_eq!(resp.routing_decision().unwrap().route_to, "task_manager");
    }

    #[test]
    fn text_parse_fallback_targets() {
        let r = router();
        let resp = r.parse_text_routing("they need authentication first", "s1");
        assert_eq!(resp.routing_decision().unwrap().route_to, "identity");
        let resp = r.parse_text_routing("sounds like a todo", "s1");
        assert_eq!(resp.routing_decision().unwrap().route_to, "task_manager");
    }
}
