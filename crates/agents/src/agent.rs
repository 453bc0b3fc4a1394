use parking_lot::Mutex;
use serde_json::Value;

use vx_domain::{Response, Result, Signal};
use vx_sessions::{GlobalContext, HandoffData};

use crate::prompt;
use crate::tool::ToolSet;

/// What the model should answer with for this agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseModality {
    Audio,
    Text,
}

/// Per-agent model configuration.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub temperature: f32,
    pub modality: ResponseModality,
    pub voice: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            modality: ResponseModality::Audio,
            voice: "Kore".into(),
        }
    }
}

/// The capability set shared by every agent.
///
/// `process_signal` drives the text-mode path (CLI, browser). On the
/// carrier path the bridge talks to the live session directly and only
/// uses `render_prompt`, the tool set, and the lifecycle hooks.
#[async_trait::async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn tools(&self) -> &ToolSet;

    fn model_settings(&self) -> &ModelSettings;

    /// The rendered system prompt, including any handoff injection from
    /// the most recent `on_enter`.
    fn render_prompt(&self, ctx: &GlobalContext) -> String;

    async fn process_signal(&self, signal: &Signal, ctx: &mut GlobalContext) -> Result<Response>;

    /// Called when this agent becomes active. `handoff` carries context
    /// from the previous agent for a warm transition.
    async fn on_enter(&self, ctx: &mut GlobalContext, handoff: Option<&HandoffData>) -> Result<()>;

    /// Called when routing away from this agent.
    async fn on_exit(&self, ctx: &mut GlobalContext) -> Result<()>;

    /// Turn a tool result into an optional user-directed response.
    async fn handle_tool_result(
        &self,
        tool_name: &str,
        result: &Value,
        ctx: &mut GlobalContext,
    ) -> Result<Option<Response>>;
}

/// State shared by the concrete agents: name, prompt template, model
/// settings, tool set, and the handoff injection captured on enter.
pub struct AgentCore {
    pub name: String,
    pub prompt_template: String,
    pub settings: ModelSettings,
    pub tools: ToolSet,
    handoff_context: Mutex<Option<String>>,
}

impl AgentCore {
    pub fn new(
        name: impl Into<String>,
        prompt_template: String,
        settings: ModelSettings,
        tools: ToolSet,
    ) -> Self {
        Self {
            name: name.into(),
            prompt_template,
            settings,
            tools,
            handoff_context: Mutex::new(None),
        }
    }

    /// Render the prompt template against the context, appending the
    /// handoff injection block verbatim when present.
    pub fn render(&self, ctx: &GlobalContext) -> String {
        let rendered = prompt::render(&self.prompt_template, &ctx.template_vars());
        match self.handoff_context.lock().as_deref() {
            Some(block) if !block.is_empty() => format!("{rendered}\n\n{block}"),
            _ => rendered,
        }
    }

    /// Capture (or clear) the handoff injection on activation.
    pub fn enter(&self, handoff: Option<&HandoffData>) {
        let injection = handoff.map(HandoffData::to_context_injection);
        tracing::info!(
            agent = %self.name,
            has_handoff = handoff.is_some(),
            "agent activated"
        );
        if let Some(h) = handoff {
            tracing::info!(
                agent = %self.name,
                source = %h.source_agent,
                greeting_completed = h.greeting_completed,
                "warm handoff received"
            );
        }
        *self.handoff_context.lock() = injection;
    }

    /// Drop the handoff injection on deactivation.
    pub fn exit(&self) {
        tracing::info!(agent = %self.name, "agent deactivated");
        *self.handoff_context.lock() = None;
    }

    /// Text-mode processing shared by the model-backed agents: append the
    /// user turn to the agent's conversation, call the model with the
    /// rendered prompt and tool schemas, and map the reply onto a
    /// response (tool calls win over text).
    pub async fn process_via_model(
        &self,
        client: &std::sync::Arc<dyn vx_providers::LiveClient>,
        conversation: &Mutex<Vec<vx_providers::ChatMessage>>,
        signal: &Signal,
        ctx: &GlobalContext,
    ) -> Result<Response> {
        use vx_providers::{ChatMessage, GenerateRequest};

        let Some(text) = signal.text_content().map(str::to_owned) else {
            // Raw audio reaches the model only over the live path.
            return Ok(Response::text(
                &signal.session_id,
                &self.name,
                "I'm sorry, I couldn't process that.",
            ));
        };

        let messages = {
            let mut convo = conversation.lock();
            convo.push(ChatMessage::user(&text));
            convo.clone()
        };

        let reply = client
            .generate(GenerateRequest {
                system_prompt: self.render(ctx),
                messages,
                tools: self.tools.schemas(),
                temperature: Some(self.settings.temperature),
            })
            .await
            .map_err(|e| vx_domain::Error::agent(&self.name, e.to_string(), true))?;

        if !reply.tool_calls.is_empty() {
            return Ok(Response::tool_calls(
                &signal.session_id,
                &self.name,
                reply.tool_calls,
            ));
        }

        let content = reply.text.unwrap_or_else(|| "I understand.".to_owned());
        conversation
            .lock()
            .push(vx_providers::ChatMessage::assistant(&content));
        Ok(Response::text(&signal.session_id, &self.name, content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn core() -> AgentCore {
        AgentCore::new(
            "greeter",
            "Hello {{user_name}}.".into(),
            ModelSettings::default(),
            ToolSet::default(),
        )
    }

    fn handoff(greeted: bool) -> HandoffData {
        HandoffData {
            source_agent: "router".into(),
            target_agent: "greeter".into(),
            last_user_turn: None,
            user_intent: None,
            user_name: Some("Alice Ng".into()),
            greeting_completed: greeted,
            scratchpad_snapshot: HashMap::new(),
            reason: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn render_without_handoff() {
        let ctx = GlobalContext::new("test");
        assert_eq!(core().render(&ctx), "Hello Guest.");
    }

    #[test]
    fn render_appends_handoff_block_after_enter() {
        let ctx = GlobalContext::new("test");
        let core = core();
        core.enter(Some(&handoff(true)));

        let prompt = core.render(&ctx);
        assert!(prompt.starts_with("Hello Guest."));
        assert!(prompt.contains("[HANDOFF CONTEXT]"));
        assert!(prompt.contains("User Name: Alice Ng"));
        assert!(prompt.contains("Do NOT re-greet"));
    }

    #[test]
    fn exit_clears_handoff_block() {
        let ctx = GlobalContext::new("test");
        let core = core();
        core.enter(Some(&handoff(false)));
        core.exit();
        assert_eq!(core.render(&ctx), "Hello Guest.");
    }
}
