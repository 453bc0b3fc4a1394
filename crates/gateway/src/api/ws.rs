//! WebSocket endpoints: the carrier media stream and the browser audio
//! channel.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;

use vx_sessions::{Platform, SessionContext};

use crate::bridge;
use crate::runtime::io::BrowserWsHandler;
use crate::state::AppState;

/// `GET /ws/call/:call_sid` — carrier media stream upgrade.
pub async fn carrier_ws(
    ws: WebSocketUpgrade,
    Path(call_sid): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    // Query extraction percent-decodes, restoring '+' prefixes.
    let from_number = params
        .get("from_number")
        .cloned()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".into());

    ws.on_upgrade(move |socket| bridge::handle_call(state, socket, call_sid, from_number))
}

/// `GET /ws/audio` — browser audio channel; runs a dedicated
/// orchestrator for the connection.
pub async fn browser_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let session_id = uuid::Uuid::new_v4().to_string();
        let session = SessionContext::new(&session_id, Platform::Web);
        let mut orchestrator = state.build_orchestrator(session);
        let handler = Arc::new(BrowserWsHandler::new(&session_id, socket));

        if let Err(e) = orchestrator.run(handler).await {
            tracing::error!(error = %e, session_id, "browser session error");
        }
    })
}
