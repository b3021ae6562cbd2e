use axum::{extract::State, http::StatusCode, Json};
use cadence_scheduler::identity::is_alive;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: 200 while the store answers, 503 otherwise.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let alive = is_alive(state.store());
    let status = if alive {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if alive { "ok" } else { "unavailable" },
            "version": crate::VERSION,
            "client_name": state.config.client_name,
            "active": state.identity_held(),
        })),
    )
}
