//! Gemini adapter.
//!
//! Live path: the `BidiGenerateContent` WebSocket — audio frames in both
//! directions plus function calls, over one long-lived session per agent.
//! Text path: the REST `generateContent` endpoint, used by the router's
//! fallback decision. Auth is an API key query parameter in both paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use vx_domain::config::LlmConfig;
use vx_domain::{Error, Result, ToolCall};

use crate::traits::{
    ChatRole, GenerateRequest, GenerateResponse, LiveClient, LiveEvent, LiveSender, LiveSession,
    ToolSchema,
};

const HTTP_BASE: &str = "https://generativelanguage.googleapis.com";
const WS_BASE: &str = "wss://generativelanguage.googleapis.com/ws";
const BIDI_SERVICE: &str = "google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Consecutive receive failures tolerated before the event stream ends
/// with an error.
const MAX_RECEIVE_RETRIES: u32 = 5;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Gemini client holding connection parameters shared by all sessions.
pub struct GeminiLiveClient {
    api_key: String,
    model: String,
    voice: String,
    temperature: f32,
    max_output_tokens: u32,
    http: reqwest::Client,
    http_base: String,
    ws_base: String,
}

impl GeminiLiveClient {
    pub fn new(cfg: &LlmConfig, api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            api_key,
            model: cfg.model.clone(),
            voice: cfg.voice.clone(),
            temperature: cfg.temperature,
            max_output_tokens: cfg.max_output_tokens,
            http,
            http_base: HTTP_BASE.to_string(),
            ws_base: WS_BASE.to_string(),
        })
    }

    fn live_url(&self) -> String {
        format!("{}/{}?key={}", self.ws_base, BIDI_SERVICE, self.api_key)
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.http_base, self.model, self.api_key
        )
    }

    fn setup_message(&self, system_prompt: &str, tools: &[ToolSchema]) -> Value {
        let mut setup = json!({
            "model": format!("models/{}", self.model),
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "temperature": self.temperature,
                "maxOutputTokens": self.max_output_tokens,
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": self.voice }
                    }
                }
            },
            "systemInstruction": {
                "parts": [{ "text": system_prompt }]
            }
        });
        if !tools.is_empty() {
            setup["tools"] = json!([{ "functionDeclarations": tools }]);
        }
        json!({ "setup": setup })
    }

    fn generate_body(&self, req: &GenerateRequest) -> Value {
        let contents: Vec<Value> = req
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "model",
                };
                json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        let mut body = json!({
            "contents": contents,
            "systemInstruction": { "parts": [{ "text": req.system_prompt }] },
            "generationConfig": {
                "temperature": req.temperature.unwrap_or(self.temperature),
            }
        });
        if !req.tools.is_empty() {
            body["tools"] = json!([{ "functionDeclarations": req.tools }]);
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sender
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct GeminiSender {
    out_tx: mpsc::Sender<Message>,
    /// call_id → function name, needed for tool responses.
    pending_calls: Arc<Mutex<HashMap<String, String>>>,
    stopped: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl LiveSender for GeminiSender {
    async fn send_audio(&self, pcm16_16khz: Vec<u8>) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Ok(());
        }
        let msg = json!({
            "realtimeInput": {
                "mediaChunks": [{
                    "mimeType": "audio/pcm;rate=16000",
                    "data": B64.encode(&pcm16_16khz),
                }]
            }
        });
        // Transient audio errors do not stop the session.
        if let Err(e) = self.out_tx.send(Message::Text(msg.to_string())).await {
            tracing::debug!(error = %e, "dropping audio frame, session writer gone");
        }
        Ok(())
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Ok(());
        }
        let msg = json!({
            "clientContent": {
                "turns": [{ "role": "user", "parts": [{ "text": text }] }],
                "turnComplete": true,
            }
        });
        self.out_tx
            .send(Message::Text(msg.to_string()))
            .await
            .map_err(|_| Error::WebSocket("live session closed".into()))
    }

    async fn send_tool_response(&self, call_id: &str, result: Value) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Ok(());
        }
        let name = self
            .pending_calls
            .lock()
            .remove(call_id)
            .unwrap_or_else(|| call_id.to_owned());
        let msg = json!({
            "toolResponse": {
                "functionResponses": [{
                    "id": call_id,
                    "name": name,
                    "response": result,
                }]
            }
        });
        self.out_tx
            .send(Message::Text(msg.to_string()))
            .await
            .map_err(|_| Error::WebSocket("live session closed".into()))
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LiveClient impl
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LiveClient for GeminiLiveClient {
    async fn open_session(
        &self,
        system_prompt: &str,
        tools: &[ToolSchema],
    ) -> Result<LiveSession> {
        let (ws, _) = tokio_tungstenite::connect_async(self.live_url())
            .await
            .map_err(|e| Error::WebSocket(format!("live connect: {e}")))?;
        let (mut ws_sink, mut ws_stream) = ws.split();

        // Handshake: send the setup message, wait for setupComplete.
        let setup = self.setup_message(system_prompt, tools);
        ws_sink
            .send(Message::Text(setup.to_string()))
            .await
            .map_err(|e| Error::WebSocket(format!("live setup: {e}")))?;

        tracing::info!(model = %self.model, "live session connecting");

        let (out_tx, mut out_rx) = mpsc::channel::<Message>(64);
        let (event_tx, event_rx) = mpsc::channel::<Result<LiveEvent>>(64);
        let pending_calls: Arc<Mutex<HashMap<String, String>>> = Arc::default();
        let stopped = Arc::new(AtomicBool::new(false));

        // Writer task: forwards outbound channel messages to the socket.
        let writer_stopped = stopped.clone();
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if writer_stopped.load(Ordering::Acquire) {
                    break;
                }
                if let Err(e) = ws_sink.send(msg).await {
                    tracing::debug!(error = %e, "live writer ending");
                    break;
                }
            }
            let _ = ws_sink.send(Message::Close(None)).await;
        });

        // Reader task: parses server messages into live events.
        let reader_pending = pending_calls.clone();
        let reader_stopped = stopped.clone();
        tokio::spawn(async move {
            let mut consecutive_errors: u32 = 0;
            loop {
                if reader_stopped.load(Ordering::Acquire) {
                    break;
                }
                match ws_stream.next().await {
                    None => break,
                    Some(Ok(msg)) => {
                        consecutive_errors = 0;
                        let payload = match msg {
                            Message::Text(t) => t,
                            Message::Binary(b) => match String::from_utf8(b) {
                                Ok(t) => t,
                                Err(_) => continue,
                            },
                            Message::Close(frame) => {
                                let code: u16 = frame
                                    .as_ref()
                                    .map(|f| f.code.into())
                                    .unwrap_or(1000);
                                if code == 1000 || code == 1001 {
                                    tracing::debug!("live session closed normally");
                                } else {
                                    tracing::warn!(code, "live session closed abnormally");
                                }
                                break;
                            }
                            _ => continue,
                        };
                        if let Some(event) = parse_live_payload(&payload, &reader_pending) {
                            if event_tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        consecutive_errors += 1;
                        if consecutive_errors > MAX_RECEIVE_RETRIES {
                            let _ = event_tx
                                .send(Err(Error::WebSocket(format!(
                                    "live receive failed after {MAX_RECEIVE_RETRIES} retries: {e}"
                                ))))
                                .await;
                            break;
                        }
                        tracing::warn!(error = %e, attempt = consecutive_errors, "live receive error, retrying");
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                }
            }
        });

        Ok(LiveSession {
            sender: Arc::new(GeminiSender {
                out_tx,
                pending_calls,
                stopped,
            }),
            events: event_rx,
        })
    }

    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse> {
        let body = self.generate_body(&req);
        let resp = self
            .http
            .post(self.generate_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Provider {
                provider: "gemini".into(),
                message: format!("{status}: {text}"),
            });
        }

        let value: Value = resp.json().await.map_err(|e| Error::Http(e.to_string()))?;
        Ok(parse_generate_response(&value))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server message parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parse one live-channel server payload into an event.
///
/// Returns `None` for handshake acks and payloads with no content.
fn parse_live_payload(
    payload: &str,
    pending_calls: &Mutex<HashMap<String, String>>,
) -> Option<LiveEvent> {
    let value: Value = serde_json::from_str(payload).ok()?;
    let mut event = LiveEvent::default();

    if let Some(server_content) = value.get("serverContent") {
        if let Some(parts) = server_content
            .get("modelTurn")
            .and_then(|t| t.get("parts"))
            .and_then(|p| p.as_array())
        {
            for part in parts {
                if let Some(data) = part
                    .get("inlineData")
                    .and_then(|d| d.get("data"))
                    .and_then(|d| d.as_str())
                {
                    if let Ok(bytes) = B64.decode(data) {
                        match event.audio_data.as_mut() {
                            Some(buf) => buf.extend_from_slice(&bytes),
                            None => event.audio_data = Some(bytes),
                        }
                    }
                }
                if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                    event.text = Some(match event.text.take() {
                        Some(prev) => format!("{prev}{text}"),
                        None => text.to_owned(),
                    });
                }
            }
        }
        if server_content
            .get("turnComplete")
            .and_then(|t| t.as_bool())
            .unwrap_or(false)
        {
            event.turn_complete = true;
        }
    }

    if let Some(calls) = value
        .get("toolCall")
        .and_then(|tc| tc.get("functionCalls"))
        .and_then(|fc| fc.as_array())
    {
        for fc in calls {
            let name = fc.get("name").and_then(|n| n.as_str())?.to_owned();
            let call_id = fc
                .get("id")
                .and_then(|i| i.as_str())
                .unwrap_or(name.as_str())
                .to_owned();
            let arguments = fc.get("args").cloned().unwrap_or_else(|| json!({}));
            pending_calls.lock().insert(call_id.clone(), name.clone());
            event
                .tool_calls
                .push(ToolCall::new(name, arguments).with_call_id(call_id));
        }
    }

    if event.is_empty() && !event.turn_complete {
        return None;
    }
    Some(event)
}

/// Parse a REST `generateContent` response body.
fn parse_generate_response(value: &Value) -> GenerateResponse {
    let mut out = GenerateResponse::default();

    let parts = value
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array());

    if let Some(parts) = parts {
        let mut text = String::new();
        for part in parts {
            if let Some(t) = part.get("text").and_then(|t| t.as_str()) {
                text.push_str(t);
            }
            if let Some(fc) = part.get("functionCall") {
                if let Some(name) = fc.get("name").and_then(|n| n.as_str()) {
                    out.tool_calls.push(ToolCall::new(
                        name,
                        fc.get("args").cloned().unwrap_or_else(|| json!({})),
                    ));
                }
            }
        }
        if !text.is_empty() {
            out.text = Some(text);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GeminiLiveClient {
        GeminiLiveClient::new(&LlmConfig::default(), "test-key".into()).unwrap()
    }

    #[test]
    fn setup_message_includes_tools_and_voice() {
        let tools = vec![ToolSchema {
            name: "transfer_agent".into(),
            description: "route".into(),
            parameters: json!({"type": "object"}),
        }];
        let setup = client().setup_message("You are a receptionist.", &tools);

        assert_eq!(
            setup["setup"]["model"],
            json!("models/gemini-2.0-flash-exp")
        );
        assert_eq!(
            setup["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]
                ["prebuiltVoiceConfig"]["voiceName"],
            json!("Kore")
        );
        assert_eq!(
            setup["setup"]["tools"][0]["functionDeclarations"][0]["name"],
            json!("transfer_agent")
        );
        assert_eq!(
            setup["setup"]["systemInstruction"]["parts"][0]["text"],
            json!("You are a receptionist.")
        );
    }

    #[test]
    fn setup_message_omits_empty_tools() {
        let setup = client().setup_message("prompt", &[]);
        assert!(setup["setup"].get("tools").is_none());
    }

    #[test]
    fn parse_audio_and_turn_complete() {
        let pending = Mutex::new(HashMap::new());
        let payload = json!({
            "serverContent": {
                "modelTurn": {
                    "parts": [
                        { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": B64.encode([1u8, 2, 3]) } },
                        { "text": "hello" }
                    ]
                },
                "turnComplete": true
            }
        })
        .to_string();

        let event = parse_live_payload(&payload, &pending).unwrap();
        assert_eq!(event.audio_data.as_deref(), Some(&[1u8, 2, 3][..]));
        assert_eq!(event.text.as_deref(), Some("hello"));
        assert!(event.turn_complete);
    }

    #[test]
    fn parse_tool_call_tracks_pending_name() {
        let pending = Mutex::new(HashMap::new());
        let payload = json!({
            "toolCall": {
                "functionCalls": [
                    { "id": "c1", "name": "create_user", "args": { "phone_number": "+15550100" } }
                ]
            }
        })
        .to_string();

        let event = parse_live_payload(&payload, &pending).unwrap();
        assert_eq!(event.tool_calls.len(), 1);
        assert_eq!(event.tool_calls[0].tool_name, "create_user");
        assert_eq!(event.tool_calls[0].call_id, "c1");
        assert_eq!(pending.lock().get("c1").unwrap(), "create_user");
    }

    #[test]
    fn parse_setup_complete_yields_nothing() {
        let pending = Mutex::new(HashMap::new());
        assert!(parse_live_payload(r#"{"setupComplete":{}}"#, &pending).is_none());
    }

    #[test]
    fn parse_generate_extracts_text_and_calls() {
        let body = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "routing to tasks" },
                        { "functionCall": { "name": "transfer_agent", "args": { "target_agent_name": "task_manager" } } }
                    ]
                }
            }]
        });
        let resp = parse_generate_response(&body);
        assert_eq!(resp.text.as_deref(), Some("routing to tasks"));
        assert_eq!(resp.tool_calls[0].tool_name, "transfer_agent");
        assert_eq!(
            resp.tool_calls[0].str_arg("target_agent_name"),
            Some("task_manager")
        );
    }
}
