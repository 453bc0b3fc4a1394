//! Line-oriented handler for the `voxgate chat` test harness.

use std::sync::atomic::{AtomicBool, Ordering};

use async_stream::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use vx_domain::stream::BoxStream;
use vx_domain::{Response, Result, Signal};

use super::{FillerState, IoHandler};

pub struct CliHandler {
    session_id: String,
    filler: FillerState,
    running: AtomicBool,
}

impl CliHandler {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            filler: FillerState::default(),
            running: AtomicBool::new(true),
        }
    }
}

#[async_trait::async_trait]
impl IoHandler for CliHandler {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn filler(&self) -> &FillerState {
        &self.filler
    }

    fn stream_input(&self) -> BoxStream<'_, Signal> {
        Box::pin(stream! {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while self.running.load(Ordering::Acquire) {
                eprint!("\n[You]: ");
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line.trim().to_owned(),
                    Ok(None) | Err(_) => break,
                };
                if line.is_empty() {
                    continue;
                }
                if matches!(line.to_lowercase().as_str(), "exit" | "quit" | "bye") {
                    break;
                }
                yield Signal::text(&self.session_id, line);
            }
        })
    }

    async fn stream_output(&self, response: &Response) -> Result<()> {
        if let Some(text) = response.text_content() {
            println!("\n[{}]: {text}", response.agent_name);
        } else if let Some(audio) = response.audio_data() {
            println!(
                "\n[{}]: [Audio Response - {} bytes]",
                response.agent_name,
                audio.len()
            );
        } else if let Some(decision) = response.routing_decision() {
            tracing::debug!(route_to = %decision.route_to, "routing decision");
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        println!("\n[System]: Session ended.");
        Ok(())
    }
}
