//! Carrier (telephony) media-stream handler.
//!
//! Wraps the carrier WebSocket: inbound `media` events become μ-law
//! audio signals, outbound audio is wrapped in `media` frames with the
//! cached stream SID. `mark`/`clear` are exposed for synchronization
//! and barge-in. A filler request here does not synthesize audio — it
//! is a marker the bridge pump turns into speech through the model.

use async_stream::stream;
use axum::extract::ws::{Message, WebSocket};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

use vx_domain::stream::BoxStream;
use vx_domain::{Error, Response, Result, Signal};

use crate::bridge::wire::{self, CarrierEvent};

use super::{FillerState, IoHandler};

pub struct CarrierMediaHandler {
    session_id: String,
    stream_sid: Mutex<Option<String>>,
    filler: FillerState,
    reader: AsyncMutex<SplitStream<WebSocket>>,
    writer: AsyncMutex<SplitSink<WebSocket, Message>>,
}

impl CarrierMediaHandler {
    pub fn new(session_id: impl Into<String>, socket: WebSocket) -> Self {
        let (writer, reader) = socket.split();
        Self {
            session_id: session_id.into(),
            stream_sid: Mutex::new(None),
            filler: FillerState::default(),
            reader: AsyncMutex::new(reader),
            writer: AsyncMutex::new(writer),
        }
    }

    pub fn stream_sid(&self) -> Option<String> {
        self.stream_sid.lock().clone()
    }

    pub fn set_stream_sid(&self, sid: impl Into<String>) {
        *self.stream_sid.lock() = Some(sid.into());
    }

    /// Next raw carrier event, or `None` when the socket closes.
    ///
    /// Unparseable frames are skipped. Used directly by the bridge pump,
    /// which needs `start`/`stop` in addition to media.
    pub async fn recv_event(&self) -> Option<CarrierEvent> {
        loop {
            let msg = self.reader.lock().await.next().await;
            match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = CarrierEvent::parse(&text) {
                        return Some(event);
                    }
                    tracing::debug!("skipping unparseable carrier frame");
                }
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::error!(error = %e, "carrier receive error");
                    return None;
                }
            }
        }
    }

    async fn send_frame(&self, frame: String) -> Result<()> {
        self.writer
            .lock()
            .await
            .send(Message::Text(frame))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))
    }

    /// Send raw μ-law samples as a `media` frame.
    pub async fn send_media(&self, mulaw: &[u8]) -> Result<()> {
        let Some(sid) = self.stream_sid() else {
            return Ok(());
        };
        self.send_frame(wire::media_event(&sid, &B64.encode(mulaw))).await
    }

    /// Send a `mark` frame for output synchronization.
    pub async fn send_mark(&self, name: &str) -> Result<()> {
        let Some(sid) = self.stream_sid() else {
            return Ok(());
        };
        self.send_frame(wire::mark_event(&sid, name)).await
    }
}

#[async_trait::async_trait]
impl IoHandler for CarrierMediaHandler {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn filler(&self) -> &FillerState {
        &self.filler
    }

    fn stream_input(&self) -> BoxStream<'_, Signal> {
        Box::pin(stream! {
            while let Some(event) = self.recv_event().await {
                match event {
                    CarrierEvent::Connected => {
                        tracing::info!("carrier stream connected");
                    }
                    CarrierEvent::Start { start } => {
                        tracing::info!(stream_sid = %start.stream_sid, "carrier stream started");
                        self.set_stream_sid(&start.stream_sid);
                    }
                    CarrierEvent::Media { media } => {
                        match B64.decode(&media.payload) {
                            Ok(bytes) => {
                                let mut signal =
                                    Signal::mulaw_audio(&self.session_id, bytes);
                                if let Some(sid) = self.stream_sid() {
                                    signal = signal.with_metadata(
                                        "stream_sid",
                                        serde_json::json!(sid),
                                    );
                                }
                                if let Some(ts) = media.timestamp {
                                    signal = signal.with_metadata(
                                        "timestamp",
                                        serde_json::json!(ts),
                                    );
                                }
                                yield signal;
                            }
                            Err(e) => {
                                tracing::debug!(error = %e, "bad media payload, skipping");
                            }
                        }
                    }
                    CarrierEvent::Stop => {
                        tracing::info!("carrier stream stopped");
                        break;
                    }
                    CarrierEvent::Mark | CarrierEvent::Unknown => {}
                }
            }
        })
    }

    async fn stream_output(&self, response: &Response) -> Result<()> {
        // The carrier only carries audio; text responses are upstream
        // concerns (the model speaks for itself on this transport).
        if let Some(audio) = response.audio_data() {
            self.send_media(audio).await?;
        }
        Ok(())
    }

    async fn clear_audio(&self) -> Result<()> {
        let Some(sid) = self.stream_sid() else {
            return Ok(());
        };
        self.send_frame(wire::clear_event(&sid)).await
    }

    async fn deliver_filler(&self, phrase: &str, _agent_name: &str) -> Result<()> {
        // Marker only: the bridge pump synthesizes filler speech through
        // the live session (or a pre-rendered clip).
        tracing::info!(phrase, stream_sid = ?self.stream_sid(), "filler requested");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let _ = self.writer.lock().await.send(Message::Close(None)).await;
        Ok(())
    }
}
