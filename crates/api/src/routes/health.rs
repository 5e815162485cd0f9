use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use liveclass_core::models::SessionStatus;
use serde::Serialize;
use std::sync::Arc;

use crate::ApiState;

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    live_rooms: usize,
}

#[derive(Serialize)]
struct VersionResponse {
    version: String,
}

/// Reports `ok` when the store answers.
async fn health_check(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<HealthResponse>) {
    match state.engine.store.list_rooms(&[SessionStatus::Live]).await {
        Ok(rooms) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".to_string(),
                live_rooms: rooms.len(),
            }),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable".to_string(),
                    live_rooms: 0,
                }),
            )
        }
    }
}

async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub fn routes() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/version", get(version))
}
