//! Trigger endpoints for an external scheduler. Every run is safe to repeat
//! and to overlap with the internal ticker.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use liveclass_core::services::{ReminderReport, ScanReport};
use serde::Serialize;

use crate::middleware::auth::CronCaller;
use crate::middleware::error_handling::AppError;
use crate::ApiState;

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub ended: usize,
}

#[axum::debug_handler(state = Arc<ApiState>)]
pub async fn auto_start(State(state): State<Arc<ApiState>>, _caller: CronCaller) -> Result<Json<ScanReport>, AppError> {
    let report = state.scanner.scan().await?;
    tracing::info!(
        candidates = report.candidates,
        started = report.started(),
        failed = report.failed(),
        "Auto-start scan finished"
    );
    Ok(Json(report))
}

#[axum::debug_handler(state = Arc<ApiState>)]
pub async fn reminders(State(state): State<Arc<ApiState>>, _caller: CronCaller) -> Json<ReminderReport> {
    let report = state.reminders.run().await;
    tracing::info!(sent = report.sent(), failed = report.failed(), "Reminder run finished");
    Json(report)
}

#[axum::debug_handler(state = Arc<ApiState>)]
pub async fn sweep(State(state): State<Arc<ApiState>>, _caller: CronCaller) -> Result<Json<SweepResponse>, AppError> {
    let ended = state.lifecycle.sweep_overdue().await?;
    Ok(Json(SweepResponse { ended }))
}
