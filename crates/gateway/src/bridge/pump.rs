//! Per-call bridge supervisor.
//!
//! Accepts the carrier stream, resolves the caller, then repeatedly runs
//! one agent session — a fresh model live session per active agent —
//! until the call disconnects. Agent switches are warm: the session
//! context (with its prepared handoff) survives the live-session swap,
//! and the next agent's prompt carries the injected context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::WebSocket;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use serde_json::json;
use tokio::sync::mpsc;

use vx_agents::{Agent, ToolContext};
use vx_domain::{Result, ToolCall, TRANSFER_AGENT_TOOL};
use vx_providers::{LiveEvent, LiveSender};
use vx_sessions::{Platform, SessionContext, UserContext};

use crate::runtime::io::{CarrierMediaHandler, FillerType, IoHandler};
use crate::runtime::metrics::VuiMetrics;
use crate::runtime::orchestrator::Orchestrator;
use crate::state::AppState;

use super::audio::{bytes_to_pcm16, pcm16_to_bytes, ulaw_decode, ulaw_encode, Resampler};
use super::wire::CarrierEvent;

/// How long to wait for the carrier `start` event before falling back to
/// the query-string caller id.
const START_EVENT_TIMEOUT: Duration = Duration::from_secs(2);
/// Receive gaps up to this are heartbeat, not disconnect.
const RECEIVE_HEARTBEAT: Duration = Duration::from_secs(30);
/// Settle pause between agent sessions on a warm switch.
const SWITCH_SETTLE: Duration = Duration::from_millis(300);

/// Why one agent session ended.
enum SessionEnd {
    /// An agent switch was requested; the target's handoff is parked in
    /// the session slot.
    Switch(String),
    /// The call is over (carrier stop/disconnect or live stream end).
    Done,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Call entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn handle_call(
    state: AppState,
    socket: WebSocket,
    call_sid: String,
    from_number: String,
) {
    let handler = Arc::new(CarrierMediaHandler::new(&call_sid, socket));
    let metrics = Arc::new(VuiMetrics::new(&call_sid));

    tracing::info!(call_sid = %call_sid, initial_number = %from_number, "call connected");

    let mut session = SessionContext::new(&call_sid, Platform::Telephony);
    session
        .metadata
        .insert("phone_number".into(), json!(from_number));
    session.metadata.insert("call_sid".into(), json!(call_sid));

    let mut orchestrator = state.build_orchestrator(session);
    orchestrator.context.clear_user();
    orchestrator.set_metrics(metrics.clone());

    // Resolve the real caller id: carrier custom parameters override the
    // query-string fallback.
    let caller = await_start(&handler, &mut orchestrator, &from_number).await;
    tracing::info!(number = %caller, "final caller id resolved");

    // Authentication gate: known callers skip the gatekeeper entirely.
    let initial_agent = resolve_initial_agent(&state, &mut orchestrator, &caller);
    if let Err(e) = orchestrator.set_active_agent(&initial_agent, None).await {
        tracing::error!(error = %e, "failed to activate initial agent");
        let _ = handler.close().await;
        return;
    }

    // Session supervisor loop: one model live session per active agent.
    loop {
        match run_agent_session(&state, &handler, &mut orchestrator, &metrics).await {
            Ok(SessionEnd::Switch(target)) => {
                // The prepared handoff is consumed from the session slot.
                if let Err(e) = orchestrator.set_active_agent(&target, None).await {
                    tracing::error!(error = %e, target = %target, "agent switch failed");
                    break;
                }
                tracing::info!(target = %target, "switching agent session");
                tokio::time::sleep(SWITCH_SETTLE).await;
            }
            Ok(SessionEnd::Done) => {
                tracing::info!("session ended normally");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "agent session error");
                break;
            }
        }
    }

    let _ = handler.close().await;
    tracing::info!(call_sid = %orchestrator.context.session.session_id, "call ended");
}

/// Wait briefly for the `start` event; cache the stream SID and pick up
/// the caller id from the stream's custom parameters.
async fn await_start(
    handler: &CarrierMediaHandler,
    orchestrator: &mut Orchestrator,
    fallback_number: &str,
) -> String {
    let wait = tokio::time::timeout(START_EVENT_TIMEOUT, async {
        while let Some(event) = handler.recv_event().await {
            match event {
                CarrierEvent::Start { start } => {
                    handler.set_stream_sid(&start.stream_sid);
                    orchestrator
                        .context
                        .session
                        .metadata
                        .insert("stream_sid".into(), json!(start.stream_sid));
                    if let Some(caller) = start.custom_parameters.get("caller") {
                        orchestrator
                            .context
                            .session
                            .metadata
                            .insert("phone_number".into(), json!(caller));
                    }
                    return true;
                }
                CarrierEvent::Connected => {
                    tracing::info!("carrier stream connected");
                }
                _ => {}
            }
        }
        false
    })
    .await;

    if wait.is_err() {
        tracing::warn!("start event timeout");
    }

    orchestrator
        .context
        .session
        .metadata
        .get("phone_number")
        .and_then(|v| v.as_str())
        .unwrap_or(fallback_number)
        .to_owned()
}

/// Look up the caller; recognized numbers get an authenticated user and
/// start on the task manager.
fn resolve_initial_agent(
    state: &AppState,
    orchestrator: &mut Orchestrator,
    number: &str,
) -> String {
    if number.is_empty() || number == "unknown" {
        return "identity".into();
    }
    let (users, _) = state.storage.repositories();
    match users.get_by_phone(number) {
        Ok(Some(user)) => {
            tracing::info!(user = user.full_name.as_deref().unwrap_or("-"), "user recognized");
            orchestrator.context.set_user(UserContext::authenticated(
                user.user_id,
                number,
                user.full_name,
            ));
            "task_manager".into()
        }
        Ok(None) => "identity".into(),
        Err(e) => {
            tracing::error!(error = %e, "caller lookup failed");
            "identity".into()
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// One agent session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_agent_session(
    state: &AppState,
    handler: &Arc<CarrierMediaHandler>,
    orchestrator: &mut Orchestrator,
    metrics: &Arc<VuiMetrics>,
) -> Result<SessionEnd> {
    let agent = orchestrator
        .active_agent()
        .ok_or_else(|| vx_domain::Error::Other("no active agent".into()))?;

    let system_prompt = agent.render_prompt(&orchestrator.context);
    let tools = agent.tools().schemas();
    let settings = agent.model_settings();

    tracing::info!(
        agent = agent.name(),
        voice = %settings.voice,
        modality = ?settings.modality,
        "starting live session"
    );
    metrics.record_routing_start();
    let mut live = state.llm.open_session(&system_prompt, &tools).await?;
    metrics.record_routing_complete(agent.name());

    seed_opener(state, orchestrator, &agent, live.sender.as_ref()).await;

    // Two concurrent pumps until either finishes. The inbound future is
    // dropped (cancelled at its next suspension point) when the outbound
    // side requests a switch, and vice versa on disconnect.
    let switch_requested = Arc::new(AtomicBool::new(false));
    let end = {
        let inbound = inbound_pump(
            handler,
            live.sender.clone(),
            metrics.clone(),
            switch_requested.clone(),
        );
        let outbound = outbound_pump(
            state,
            handler,
            orchestrator,
            &agent,
            &mut live.events,
            live.sender.clone(),
            metrics,
            &switch_requested,
        );
        tokio::select! {
            _disconnected = inbound => SessionEnd::Done,
            end = outbound => end,
        }
    };

    live.close().await;
    Ok(end)
}

/// Seed the fresh live session with a synthetic opening instruction.
async fn seed_opener(
    state: &AppState,
    orchestrator: &Orchestrator,
    agent: &Arc<dyn Agent>,
    sender: &dyn LiveSender,
) {
    match agent.name() {
        "identity" => {
            let _ = sender
                .send_text(
                    "User connected. Greet them warmly and ask for their name to create an account.",
                )
                .await;
        }
        "task_manager" => {
            let user_name = orchestrator.context.user.display_name().to_owned();
            let greeting_done = orchestrator.context.session.greeting_completed;

            let mut task_count = 0usize;
            if orchestrator.context.is_authenticated() {
                let (_, tasks) = state.storage.repositories();
                match tasks.get_open_count(&orchestrator.context.user.user_id) {
                    Ok(count) => task_count = count,
                    Err(e) => tracing::error!(error = %e, "failed to get task count"),
                }
            }
            let opener = task_manager_opener(&user_name, task_count, greeting_done);
            let _ = sender.send_text(&opener).await;
        }
        _ => {}
    }
}

/// Opening instruction for a task-manager session: greet on first
/// activation, continue without re-greeting after a warm handoff.
fn task_manager_opener(user_name: &str, task_count: usize, greeting_done: bool) -> String {
    let task_info = if task_count == 0 {
        "They have no active tasks.".to_owned()
    } else {
        format!("They have {task_count} active tasks.")
    };

    if greeting_done {
        format!(
            "User {user_name} has been handed off to you. {task_info} \
             Do NOT greet them again. Mention the task count briefly and \
             ask if they need help with them."
        )
    } else {
        format!(
            "User {user_name} connected. {task_info} Greet them, mention \
             the {task_count} tasks they have, and ask if they need help \
             with them."
        )
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inbound pump (carrier → model)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Read carrier media, decode μ-law, up-sample 8 kHz → 16 kHz, forward
/// to the live session. Returns `true` on disconnect.
async fn inbound_pump(
    handler: &Arc<CarrierMediaHandler>,
    sender: Arc<dyn LiveSender>,
    metrics: Arc<VuiMetrics>,
    switch_requested: Arc<AtomicBool>,
) -> bool {
    // Up-sampling state is continuous across frames within this session.
    let mut upsampler = Resampler::new(8_000, 16_000);

    loop {
        if switch_requested.load(Ordering::Acquire) {
            return false;
        }
        match tokio::time::timeout(RECEIVE_HEARTBEAT, handler.recv_event()).await {
            // Quiet line; the connection may still be alive.
            Err(_) => continue,
            Ok(None) => {
                tracing::info!("carrier websocket disconnected");
                return true;
            }
            Ok(Some(event)) => match event {
                CarrierEvent::Media { media } => {
                    metrics.record_user_speech_end();
                    match B64.decode(&media.payload) {
                        Ok(mulaw) => {
                            let pcm_8k = ulaw_decode(&mulaw);
                            let pcm_16k = upsampler.process(&pcm_8k);
                            let _ = sender.send_audio(pcm16_to_bytes(&pcm_16k)).await;
                        }
                        Err(e) => tracing::debug!(error = %e, "bad media payload"),
                    }
                }
                CarrierEvent::Start { start } => {
                    // Late (re)start: refresh the cached stream SID.
                    handler.set_stream_sid(&start.stream_sid);
                }
                CarrierEvent::Stop => {
                    tracing::info!("carrier stream stop received");
                    return true;
                }
                CarrierEvent::Connected | CarrierEvent::Mark | CarrierEvent::Unknown => {}
            },
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outbound pump (model → carrier)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Drain live-session events: audio goes down-sampled and μ-law-encoded
/// to the carrier; tool calls execute inline; `transfer_agent` ends the
/// session with a switch request.
#[allow(clippy::too_many_arguments)]
async fn outbound_pump(
    state: &AppState,
    handler: &Arc<CarrierMediaHandler>,
    orchestrator: &mut Orchestrator,
    agent: &Arc<dyn Agent>,
    events: &mut mpsc::Receiver<Result<LiveEvent>>,
    sender: Arc<dyn LiveSender>,
    metrics: &Arc<VuiMetrics>,
    switch_requested: &AtomicBool,
) -> SessionEnd {
    // Down-sampling state is continuous across frames within this
    // session and reset on session swap.
    let mut downsampler = Resampler::new(24_000, 8_000);
    let mut first_audio_sent = false;

    while let Some(event) = events.recv().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "live session receive error");
                break;
            }
        };

        if let Some(audio) = &event.audio_data {
            if !first_audio_sent {
                metrics.record_first_audio_sent();
                first_audio_sent = true;
            }
            let pcm_24k = bytes_to_pcm16(audio);
            let pcm_8k = downsampler.process(&pcm_24k);
            if let Err(e) = handler.send_media(&ulaw_encode(&pcm_8k)).await {
                tracing::warn!(error = %e, "send audio error");
                break;
            }
            metrics.reset_silence_tracker();
            orchestrator.context.session.mark_greeting_completed();
        }

        if let Some(text) = &event.text {
            tracing::debug!(text, "live session text");
        }

        if event.turn_complete {
            // Playback checkpoint so barge-in can tell what was heard.
            let _ = handler.send_mark("turn").await;
        }

        for call in event.tool_calls {
            if call.tool_name == TRANSFER_AGENT_TOOL {
                let target = prepare_transfer(orchestrator, handler, &call).await;
                switch_requested.store(true, Ordering::Release);
                return SessionEnd::Switch(target);
            }

            let (result, switch_to) =
                execute_bridge_tool(state, orchestrator, metrics, handler, agent, &call).await;
            if let Some(target) = switch_to {
                switch_requested.store(true, Ordering::Release);
                return SessionEnd::Switch(target);
            }
            let _ = sender.send_tool_response(&call.call_id, result).await;
        }
    }

    SessionEnd::Done
}

/// Build the warm handoff for a `transfer_agent` call and return the
/// target. The envelope lives in the session slot only.
async fn prepare_transfer(
    orchestrator: &mut Orchestrator,
    handler: &Arc<CarrierMediaHandler>,
    call: &ToolCall,
) -> String {
    let target = call
        .str_arg("target_agent_name")
        .unwrap_or("task_manager")
        .to_owned();
    let reason = call.str_arg("reason").unwrap_or_default().to_owned();
    tracing::info!(target = %target, reason = %reason, "transfer_agent intercepted");

    let _ = handler
        .send_filler(FillerType::Routing, &orchestrator.context.session.active_agent.clone())
        .await;

    let user_intent = orchestrator
        .context
        .session
        .last_user_turn()
        .map(str::to_owned);
    let mut handoff = orchestrator
        .context
        .session
        .prepare_handoff(&target, Some(reason), user_intent);
    if orchestrator.context.is_authenticated() {
        handoff.user_name = orchestrator.context.user.full_name.clone();
        orchestrator.context.session.handoff_data = Some(handoff);
    }

    handler.cancel_filler().await;
    target
}

/// Execute a regular tool inline. A successful `create_user` installs
/// the authenticated user and forces a switch to the task manager.
async fn execute_bridge_tool(
    state: &AppState,
    orchestrator: &mut Orchestrator,
    metrics: &Arc<VuiMetrics>,
    handler: &Arc<CarrierMediaHandler>,
    agent: &Arc<dyn Agent>,
    call: &ToolCall,
) -> (serde_json::Value, Option<String>) {
    let Some(tool) = agent.tools().get(&call.tool_name) else {
        return (
            json!({ "error": format!("Tool '{}' not found", call.tool_name) }),
            None,
        );
    };

    let filler_started = if tool.is_slow {
        let _ = handler
            .send_filler(FillerType::for_tool(&call.tool_name), agent.name())
            .await;
        Some((Instant::now(), FillerType::for_tool(&call.tool_name)))
    } else {
        None
    };

    let tool_ctx = ToolContext::new(
        orchestrator.context.session.session_id.clone(),
        orchestrator
            .context
            .is_authenticated()
            .then(|| orchestrator.context.user.user_id.clone()),
    );

    let started = Instant::now();
    tracing::info!(tool = %call.tool_name, args = %call.arguments, "executing tool");
    let outcome = tool.invoke(tool_ctx, call.arguments.clone()).await;
    let duration_ms = started.elapsed().as_secs_f64() * 1_000.0;
    metrics.record_tool_execution(&call.tool_name, duration_ms);

    if let Some((filler_start, filler_type)) = filler_started {
        handler.cancel_filler().await;
        metrics.record_filler_played(
            filler_type.as_str(),
            filler_start.elapsed().as_secs_f64() * 1_000.0,
        );
    }

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(tool = %call.tool_name, error = %e, "tool execution error");
            return (json!({ "error": e.to_string() }), None);
        }
    };
    tracing::info!(tool = %call.tool_name, duration_ms = duration_ms.round(), "tool executed");

    // Account creation authenticates the caller mid-call.
    if call.tool_name == "create_user"
        && result.get("success").and_then(|s| s.as_bool()).unwrap_or(false)
    {
        let full_name = result
            .get("full_name")
            .and_then(|n| n.as_str())
            .map(str::to_owned);
        let user_id = result
            .get("user_id")
            .and_then(|i| i.as_str())
            .unwrap_or_default()
            .to_owned();
        let phone = orchestrator
            .context
            .session
            .metadata
            .get("phone_number")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_owned();

        tracing::info!(user = full_name.as_deref().unwrap_or("-"), "user created, switching to task manager");

        orchestrator
            .context
            .set_user(UserContext::authenticated(user_id, phone, full_name.clone()));

        let mut handoff = orchestrator.context.session.prepare_handoff(
            "task_manager",
            Some("User authenticated".into()),
            None,
        );
        handoff.user_name = full_name.clone();
        orchestrator.context.session.handoff_data = Some(handoff);

        let message = format!(
            "Account created for {}. Transferring to task manager.",
            full_name.as_deref().unwrap_or("the caller")
        );
        return (
            json!({ "success": true, "message": message }),
            Some("task_manager".to_owned()),
        );
    }

    (result, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opener_greets_returning_caller_with_count() {
        let opener = task_manager_opener("Bob", 3, false);
        assert!(opener.starts_with("User Bob connected. They have 3 active tasks."));
        assert!(opener.contains("Greet them, mention the 3 tasks"));
    }

    #[test]
    fn opener_suppresses_greeting_after_handoff() {
        let opener = task_manager_opener("Alice Ng", 0, true);
        assert!(opener.contains("has been handed off to you"));
        assert!(opener.contains("They have no active tasks."));
        assert!(opener.contains("Do NOT greet them again."));
        assert!(!opener.contains("Greet them,"));
    }
}
