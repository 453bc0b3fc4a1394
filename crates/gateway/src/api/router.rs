use axum::extract::State;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the gateway's route table.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(voice_health))
        .route("/voice", post(super::voice::voice_webhook))
        .route("/ws/call/:call_sid", get(super::ws::carrier_ws))
        .route("/ws/audio", get(super::ws::browser_ws))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> Html<&'static str> {
    Html("<html><body><h1>VoxGate</h1><p>Active</p></body></html>")
}

/// `GET /health` — storage-backed liveness.
async fn voice_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let healthy = state.storage.health_check();
    Json(serde_json::json!({
        "status": if healthy { "healthy" } else { "degraded" },
    }))
}
