use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Jobs currently held in the status store, completed-but-unevicted
    /// included.
    pub jobs_active: usize,
}

/// GET /health — liveness plus a cheap look at pipeline load.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        jobs_active: state.store.active_jobs(),
    })
}
