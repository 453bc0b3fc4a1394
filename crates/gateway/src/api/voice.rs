//! Carrier voice webhook.
//!
//! Answers the carrier's incoming-call webhook with a voice-response
//! document instructing it to open a media stream at our carrier
//! WebSocket, carrying the call SID as the session id and the caller id
//! as a custom stream parameter.

use std::collections::HashMap;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Form;

use crate::state::AppState;

/// `POST /voice` — returns the stream-connect document.
pub async fn voice_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let call_sid = form
        .get("CallSid")
        .map(String::as_str)
        .unwrap_or("unknown");
    let from_number = form.get("From").map(String::as_str).unwrap_or("unknown");

    let host = state
        .config
        .server
        .public_host
        .clone()
        .or_else(|| header_str(&headers, "x-forwarded-host"))
        .or_else(|| header_str(&headers, "host"))
        .unwrap_or_else(|| {
            format!(
                "{}:{}",
                state.config.server.host, state.config.server.port
            )
        });
    let proto = header_str(&headers, "x-forwarded-proto").unwrap_or_else(|| "http".into());
    let ws_scheme = if proto == "https" { "wss" } else { "ws" };

    // E.164 caller ids carry a '+' that must survive the query string.
    let encoded_from = from_number.replace('+', "%2B");
    let ws_url = format!("{ws_scheme}://{host}/ws/call/{call_sid}?from_number={encoded_from}");

    let twiml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
    <Say>Connecting you now.</Say>
    <Connect>
        <Stream url="{ws_url}">
            <Parameter name="caller" value="{from_number}"/>
        </Stream>
    </Connect>
</Response>"#
    );

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xml")],
        twiml,
    )
        .into_response()
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}
