//! The orchestrator: event loop, agent registry, routing, and tool
//! execution with latency masking.
//!
//! Owns the [`GlobalContext`] for one call. Signals flow through the
//! intervention observer into the active agent; responses are
//! dispatched back out through the I/O handler. The `transfer_agent`
//! meta-tool is intercepted here and turned into a warm handoff.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;

use vx_agents::{Agent, ToolContext};
use vx_domain::config::ObserverConfig;
use vx_domain::{Error, Intervention, Response, Result, Signal, ToolCall, TRANSFER_AGENT_TOOL};
use vx_sessions::{GlobalContext, HandoffData, TurnRole};

use super::io::{FillerType, IoHandler};
use super::metrics::VuiMetrics;
use super::observer::{InterventionObserver, Observed};

/// Spoken when an agent hits a recoverable failure.
const AGENT_APOLOGY: &str = "I encountered an issue. Let me try again.";
/// Spoken when a tool fails or cannot be found.
const TOOL_APOLOGY: &str = "I'm having trouble with that. Let me try something else.";
/// Spoken after an intervention switch.
const INTERVENTION_ACK: &str = "I understand. How can I help you?";

const TIMEOUT_POLL: Duration = Duration::from_secs(5);
const SILENCE_POLL: Duration = Duration::from_secs(1);

pub struct Orchestrator {
    pub context: GlobalContext,
    pub observer: Arc<InterventionObserver>,
    agents: HashMap<String, Arc<dyn Agent>>,
    active: Option<Arc<dyn Agent>>,
    metrics: Option<Arc<VuiMetrics>>,
    running: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(environment: &str, observer_config: &ObserverConfig) -> Self {
        Self {
            context: GlobalContext::new(environment),
            observer: Arc::new(InterventionObserver::new(observer_config)),
            agents: HashMap::new(),
            active: None,
            metrics: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    // ── Registry ───────────────────────────────────────────────────

    /// Register an agent. Names are unique.
    pub fn register_agent(&mut self, agent: Arc<dyn Agent>) -> Result<()> {
        let name = agent.name().to_owned();
        if self.agents.contains_key(&name) {
            return Err(Error::InvalidArgument(format!(
                "agent '{name}' is already registered"
            )));
        }
        tracing::info!(agent = %name, "agent registered");
        self.agents.insert(name.clone(), agent);
        if !self.context.available_agents.contains(&name) {
            self.context.available_agents.push(name);
        }
        Ok(())
    }

    pub fn get_agent(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(name).cloned()
    }

    pub fn active_agent(&self) -> Option<Arc<dyn Agent>> {
        self.active.clone()
    }

    pub fn metrics(&self) -> Option<Arc<VuiMetrics>> {
        self.metrics.clone()
    }

    /// Install a metrics collector (the bridge shares its own).
    pub fn set_metrics(&mut self, metrics: Arc<VuiMetrics>) {
        self.metrics = Some(metrics);
    }

    // ── Agent switching ────────────────────────────────────────────

    /// Switch the active agent with warm-handoff support.
    ///
    /// `on_exit(old)` happens before `on_enter(new)` happens before the
    /// first signal the new agent sees. The session's handoff slot is
    /// consumed here whether or not an envelope was passed explicitly,
    /// so a prepared handoff is never delivered twice.
    pub async fn set_active_agent(
        &mut self,
        agent_name: &str,
        handoff: Option<HandoffData>,
    ) -> Result<()> {
        let Some(new_agent) = self.agents.get(agent_name).cloned() else {
            return Err(Error::routing(
                self.context.session.active_agent.clone(),
                agent_name,
                format!("Agent '{agent_name}' not found"),
            ));
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_routing_start();
        }

        let stored = self.context.session.consume_handoff();
        let handoff = handoff.or(stored);

        let previous = self.active.take();
        if let Some(old) = &previous {
            old.on_exit(&mut self.context).await?;
        }

        self.active = Some(new_agent.clone());
        self.context.session.switch_agent(agent_name);
        new_agent.on_enter(&mut self.context, handoff.as_ref()).await?;

        if let Some(metrics) = &self.metrics {
            metrics.record_routing_complete(agent_name);
        }

        tracing::info!(
            from_agent = previous.as_ref().map(|a| a.name()).unwrap_or("-"),
            to_agent = agent_name,
            has_handoff = handoff.is_some(),
            "agent switched"
        );
        Ok(())
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.observer.cancel();
    }

    // ── Event loop ─────────────────────────────────────────────────

    /// Run the main event loop against an I/O handler. Returns when the
    /// input stream ends, the orchestrator is stopped, or an
    /// unrecoverable error occurs.
    pub async fn run(&mut self, io: Arc<dyn IoHandler>) -> Result<()> {
        self.running.store(true, Ordering::Release);
        if self.metrics.is_none() {
            self.metrics = Some(Arc::new(VuiMetrics::new(
                self.context.session.session_id.clone(),
            )));
        }

        if self.active.is_none() {
            if self.agents.contains_key("router") {
                self.set_active_agent("router", None).await?;
            } else if let Some(name) = self.context.available_agents.first().cloned() {
                self.set_active_agent(&name, None).await?;
            } else {
                return Err(Error::Other("no agents registered".into()));
            }
        }

        tracing::info!(
            session_id = %self.context.session.session_id,
            active_agent = self.active.as_ref().map(|a| a.name()).unwrap_or("-"),
            "orchestrator started"
        );

        let result = self.event_loop(io.clone()).await;

        self.running.store(false, Ordering::Release);
        let _ = io.close().await;
        tracing::info!("orchestrator stopped");
        result
    }

    async fn event_loop(&mut self, io: Arc<dyn IoHandler>) -> Result<()> {
        // Background tasks: inactivity timeouts are funneled into the
        // loop over a channel; the silence monitor only logs.
        let (intervention_tx, mut intervention_rx) = mpsc::channel::<Intervention>(4);

        let timeout_task = tokio::spawn({
            let observer = self.observer.clone();
            let running = self.running.clone();
            let tx = intervention_tx.clone();
            async move {
                while running.load(Ordering::Acquire) {
                    tokio::time::sleep(TIMEOUT_POLL).await;
                    if let Some(intervention) = observer.check_timeout() {
                        if tx.send(intervention).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let silence_task = tokio::spawn({
            let metrics = self.metrics.clone().expect("metrics installed in run");
            let running = self.running.clone();
            async move {
                while running.load(Ordering::Acquire) {
                    tokio::time::sleep(SILENCE_POLL).await;
                    metrics.check_silence();
                }
            }
        });

        let observer = self.observer.clone();
        let mut stream = observer.watch(io.stream_input());

        let result = loop {
            if !self.running.load(Ordering::Acquire) {
                break Ok(());
            }
            tokio::select! {
                observed = stream.next() => match observed {
                    None => break Ok(()),
                    Some(Observed::Intervention(intervention)) => {
                        if let Err(e) = self.handle_intervention(intervention, io.as_ref()).await {
                            tracing::error!(error = %e, "intervention handling failed");
                        }
                    }
                    Some(Observed::Signal(signal)) => {
                        if let Some(metrics) = &self.metrics {
                            metrics.record_user_speech_end();
                        }
                        match self.process_signal(&signal).await {
                            Ok(response) => {
                                if let Err(e) = self.handle_response(response, io.as_ref()).await {
                                    if !e.is_recoverable() {
                                        break Err(e);
                                    }
                                    tracing::error!(error = %e, "response handling failed");
                                    let _ = io.send_text(AGENT_APOLOGY, "system").await;
                                }
                            }
                            Err(Error::Intervention(intervention)) => {
                                if let Err(e) =
                                    self.handle_intervention(intervention, io.as_ref()).await
                                {
                                    tracing::error!(error = %e, "intervention handling failed");
                                }
                            }
                            Err(e) if !e.is_recoverable() => break Err(e),
                            Err(e) => {
                                tracing::error!(error = %e, "agent error");
                                let _ = io.send_text(AGENT_APOLOGY, "system").await;
                            }
                        }
                    }
                },
                Some(intervention) = intervention_rx.recv() => {
                    if let Err(e) = self.handle_intervention(intervention, io.as_ref()).await {
                        tracing::error!(error = %e, "intervention handling failed");
                    }
                }
            }
        };

        drop(stream);
        timeout_task.abort();
        silence_task.abort();
        result
    }

    // ── Signal processing ──────────────────────────────────────────

    async fn process_signal(&mut self, signal: &Signal) -> Result<Response> {
        self.context.refresh_time();

        if let Some(text) = signal.text_content().map(str::to_owned) {
            self.context.session.add_turn(TurnRole::User, text, None);
        }

        // Authentication gate: anonymous callers only ever talk to the
        // identity agent.
        if !self.context.is_authenticated() {
            let on_identity = self.active.as_ref().map(|a| a.name()) == Some("identity");
            if !on_identity && self.agents.contains_key("identity") {
                let handoff = self.context.session.prepare_handoff(
                    "identity",
                    Some("Authentication required".into()),
                    None,
                );
                self.set_active_agent("identity", Some(handoff)).await?;
            }
        }

        let agent = self
            .active
            .clone()
            .ok_or_else(|| Error::Other("no active agent".into()))?;
        agent.process_signal(signal, &mut self.context).await
    }

    // ── Response dispatch ──────────────────────────────────────────

    async fn handle_response(&mut self, response: Response, io: &dyn IoHandler) -> Result<()> {
        if response.requires_tool_execution && !response.calls().is_empty() {
            // transfer_agent preempts the whole batch.
            if let Some(call) = response
                .calls()
                .iter()
                .find(|c| c.tool_name == TRANSFER_AGENT_TOOL)
                .cloned()
            {
                return self.handle_transfer_agent(&call, io).await;
            }

            if let Some(handler_response) = self.execute_tools(&response, io).await? {
                return self.emit_response(handler_response, io).await;
            }
            return Ok(());
        }

        if let Some(decision) = response.routing_decision().cloned() {
            return self.handle_routing_decision(&response.agent_name, decision, io).await;
        }

        self.emit_response(response, io).await
    }

    /// Send a user-directed response and update the session bookkeeping.
    async fn emit_response(&mut self, response: Response, io: &dyn IoHandler) -> Result<()> {
        let has_audio = response.audio_data().is_some();
        let content = response
            .text_content()
            .map(str::to_owned)
            .or_else(|| has_audio.then(|| "[audio response]".to_owned()));

        let Some(content) = content else {
            return Ok(());
        };

        if has_audio {
            if let Some(metrics) = &self.metrics {
                metrics.record_first_audio_sent();
                metrics.reset_silence_tracker();
            }
        }

        io.stream_output(&response).await?;

        self.context.session.mark_greeting_completed();
        self.context.session.add_turn(
            TurnRole::Assistant,
            content,
            Some(response.agent_name.clone()),
        );
        Ok(())
    }

    // ── transfer_agent interception ────────────────────────────────

    /// Intercept the routing meta-tool: no tool execution, just a warm
    /// handoff to the requested target.
    async fn handle_transfer_agent(&mut self, call: &ToolCall, io: &dyn IoHandler) -> Result<()> {
        let target = call
            .str_arg("target_agent_name")
            .unwrap_or("task_manager")
            .to_owned();
        let reason = call.str_arg("reason").unwrap_or_default().to_owned();
        tracing::info!(target = %target, reason = %reason, "transfer_agent intercepted");

        let source = self.active_agent_name();
        io.send_filler(FillerType::Routing, &source).await?;

        let user_intent = self.context.session.last_user_turn().map(str::to_owned);
        let handoff = self.prepare_handoff_with_user(&target, Some(reason), user_intent);

        io.cancel_filler().await;

        if self.agents.contains_key(&target) {
            self.set_active_agent(&target, Some(handoff)).await
        } else {
            tracing::warn!(target = %target, "invalid transfer target, defaulting to task_manager");
            self.set_active_agent("task_manager", Some(handoff)).await
        }
    }

    async fn handle_routing_decision(
        &mut self,
        source_agent: &str,
        decision: vx_domain::RoutingDecision,
        io: &dyn IoHandler,
    ) -> Result<()> {
        tracing::info!(
            target = %decision.route_to,
            thought = %decision.thought_process,
            "routing decision"
        );

        if !self.agents.contains_key(&decision.route_to) {
            tracing::warn!(target = %decision.route_to, "routing target not registered");
            io.send_text(AGENT_APOLOGY, source_agent).await?;
            return Ok(());
        }

        io.send_filler(FillerType::Routing, source_agent).await?;
        let handoff = self.prepare_handoff_with_user(
            &decision.route_to.clone(),
            Some(decision.thought_process),
            decision.handover_context,
        );
        io.cancel_filler().await;
        self.set_active_agent(&decision.route_to, Some(handoff)).await
    }

    /// Prepare a handoff in the session, attaching the caller's name
    /// when authenticated. The session slot stays the single authority.
    fn prepare_handoff_with_user(
        &mut self,
        target: &str,
        reason: Option<String>,
        user_intent: Option<String>,
    ) -> HandoffData {
        let mut handoff = self.context.session.prepare_handoff(target, reason, user_intent);
        if self.context.is_authenticated() {
            handoff.user_name = self.context.user.full_name.clone();
            self.context.session.handoff_data = Some(handoff.clone());
        }
        handoff
    }

    // ── Tool execution ─────────────────────────────────────────────

    /// Execute a response's tool calls with latency masking. Returns the
    /// first user-directed response an agent built from a tool result.
    async fn execute_tools(
        &mut self,
        response: &Response,
        io: &dyn IoHandler,
    ) -> Result<Option<Response>> {
        let agent = self
            .active
            .clone()
            .ok_or_else(|| Error::Other("no active agent".into()))?;

        let tool_ctx = ToolContext::new(
            self.context.session.session_id.clone(),
            self.context
                .is_authenticated()
                .then(|| self.context.user.user_id.clone()),
        );

        let mut results: Vec<serde_json::Value> = Vec::new();

        for call in response.calls() {
            if call.tool_name == TRANSFER_AGENT_TOOL {
                continue;
            }

            let outcome = match agent.tools().get(&call.tool_name) {
                None => Err(Error::tool(
                    &call.tool_name,
                    call.arguments.clone(),
                    format!("Tool '{}' not found", call.tool_name),
                )),
                Some(tool) => {
                    if tool.is_slow {
                        io.send_filler(FillerType::for_tool(&call.tool_name), agent.name())
                            .await?;
                    }
                    let started = Instant::now();
                    let outcome = tool.invoke(tool_ctx.clone(), call.arguments.clone()).await;
                    if let Some(metrics) = &self.metrics {
                        metrics.record_tool_execution(
                            &call.tool_name,
                            started.elapsed().as_secs_f64() * 1_000.0,
                        );
                    }
                    outcome
                }
            };

            io.cancel_filler().await;

            match outcome {
                Ok(result) => {
                    results.push(json!({
                        "tool_name": call.tool_name,
                        "call_id": call.call_id,
                        "success": true,
                        "result": result,
                    }));
                    if let Some(handler_response) = agent
                        .handle_tool_result(&call.tool_name, &result, &mut self.context)
                        .await?
                    {
                        return Ok(Some(handler_response));
                    }
                }
                Err(e) => {
                    tracing::error!(tool = %call.tool_name, error = %e, "tool execution failed");
                    results.push(json!({
                        "tool_name": call.tool_name,
                        "call_id": call.call_id,
                        "success": false,
                        "error": e.to_string(),
                    }));
                    io.send_text(TOOL_APOLOGY, agent.name()).await?;
                }
            }
        }

        tracing::debug!(count = results.len(), "tool batch complete");
        Ok(None)
    }

    // ── Interventions ──────────────────────────────────────────────

    async fn handle_intervention(
        &mut self,
        intervention: Intervention,
        io: &dyn IoHandler,
    ) -> Result<()> {
        tracing::info!(
            kind = ?intervention.kind,
            target = intervention.target_agent.as_deref().unwrap_or("-"),
            "handling intervention"
        );

        io.cancel_filler().await;
        io.clear_audio().await?;

        let target = intervention
            .target_agent
            .as_deref()
            .filter(|t| self.agents.contains_key(*t))
            .map(str::to_owned)
            .or_else(|| self.agents.contains_key("router").then(|| "router".to_owned()));
        if let Some(target) = target {
            self.set_active_agent(&target, None).await?;
        }

        io.send_text(INTERVENTION_ACK, &self.active_agent_name()).await?;
        self.observer.reset();
        Ok(())
    }

    fn active_agent_name(&self) -> String {
        self.active
            .as_ref()
            .map(|a| a.name().to_owned())
            .unwrap_or_else(|| "system".to_owned())
    }
}
