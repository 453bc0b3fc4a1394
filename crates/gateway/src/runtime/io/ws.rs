//! Browser WebSocket handler.
//!
//! Frames are JSON (`{type: "text"|"audio", ...}`) or raw binary PCM.
//! Outbound audio is base64-encoded PCM inside a JSON frame.

use async_stream::stream;
use axum::extract::ws::{Message, WebSocket};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::Mutex;

use vx_domain::stream::BoxStream;
use vx_domain::{Error, Response, Result, Signal};

use super::{FillerState, IoHandler};

pub struct BrowserWsHandler {
    session_id: String,
    sample_rate: u32,
    filler: FillerState,
    reader: Mutex<SplitStream<WebSocket>>,
    writer: Mutex<SplitSink<WebSocket, Message>>,
}

impl BrowserWsHandler {
    pub fn new(session_id: impl Into<String>, socket: WebSocket) -> Self {
        let (writer, reader) = socket.split();
        Self {
            session_id: session_id.into(),
            sample_rate: 16_000,
            filler: FillerState::default(),
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }

    async fn send_json(&self, value: serde_json::Value) -> Result<()> {
        self.writer
            .lock()
            .await
            .send(Message::Text(value.to_string()))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))
    }
}

#[async_trait::async_trait]
impl IoHandler for BrowserWsHandler {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn filler(&self) -> &FillerState {
        &self.filler
    }

    fn stream_input(&self) -> BoxStream<'_, Signal> {
        Box::pin(stream! {
            loop {
                let msg = {
                    let mut reader = self.reader.lock().await;
                    reader.next().await
                };
                match msg {
                    Some(Ok(Message::Binary(bytes))) => {
                        yield Signal::audio(&self.session_id, bytes, self.sample_rate);
                    }
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<serde_json::Value>(&text) {
                            Ok(frame) => match frame.get("type").and_then(|t| t.as_str()) {
                                Some("audio") => {
                                    let data = frame
                                        .get("data")
                                        .and_then(|d| d.as_str())
                                        .and_then(|d| B64.decode(d).ok());
                                    if let Some(bytes) = data {
                                        let rate = frame
                                            .get("sample_rate")
                                            .and_then(|r| r.as_u64())
                                            .map(|r| r as u32)
                                            .unwrap_or(self.sample_rate);
                                        yield Signal::audio(&self.session_id, bytes, rate);
                                    }
                                }
                                Some("text") => {
                                    if let Some(content) =
                                        frame.get("content").and_then(|c| c.as_str())
                                    {
                                        yield Signal::text(&self.session_id, content);
                                    }
                                }
                                _ => {
                                    tracing::debug!("ignoring unknown browser frame");
                                }
                            },
                            // Plain text message.
                            Err(_) => yield Signal::text(&self.session_id, text),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "browser websocket receive error");
                        break;
                    }
                }
            }
        })
    }

    async fn stream_output(&self, response: &Response) -> Result<()> {
        if let Some(audio) = response.audio_data() {
            self.send_json(json!({
                "type": "audio",
                "data": B64.encode(audio),
                "agent": response.agent_name,
            }))
            .await
        } else if let Some(text) = response.text_content() {
            self.send_json(json!({
                "type": "text",
                "content": text,
                "agent": response.agent_name,
            }))
            .await
        } else {
            Ok(())
        }
    }

    async fn close(&self) -> Result<()> {
        let _ = self.writer.lock().await.send(Message::Close(None)).await;
        Ok(())
    }
}
