use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Reports the service version and whether a user session is held.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let auth = state.tracker.auth.current();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "jobtrack",
        "signed_in": auth.has_session()
    }))
}
