//! `voxgate chat` — line-oriented test harness.
//!
//! Boots the full agent roster against the configured storage and model
//! client, then drives the orchestrator event loop from stdin.

use std::sync::Arc;

use vx_domain::config::Config;
use vx_sessions::{Platform, SessionContext};

use crate::runtime::io::CliHandler;
use crate::state::AppState;

pub async fn chat(config: Arc<Config>) -> anyhow::Result<()> {
    let state = AppState::build(config)?;

    let session_id = uuid::Uuid::new_v4().to_string();
    let session = SessionContext::new(&session_id, Platform::Cli);
    let mut orchestrator = state.build_orchestrator(session);

    eprintln!("VoxGate interactive session");
    eprintln!("Session: {session_id}  |  Type exit, quit, or bye to end");

    let handler = Arc::new(CliHandler::new(&session_id));
    orchestrator.run(handler).await?;
    Ok(())
}
