use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{NaiveDate, NaiveTime};
use liveclass_core::errors::ClassError;
use liveclass_core::models::{LifecycleTarget, NewSession, RoomEvent, Session, SessionFilter, SessionStatus};
use liveclass_core::services::TransitionOutcome;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::auth::PortalUser;
use crate::middleware::error_handling::AppError;
use crate::ApiState;

/// Query string of `GET /api/sessions`. `status` is comma-separated.
#[derive(Debug, Default, Deserialize)]
pub struct ListSessionsQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub status: Option<String>,
    pub batch_id: Option<Uuid>,
    pub teacher_email: Option<String>,
}

impl ListSessionsQuery {
    pub fn into_filter(self) -> Result<SessionFilter, ClassError> {
        let statuses = match self.status.as_deref() {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::parse::<SessionStatus>)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        Ok(SessionFilter {
            from: self.from,
            to: self.to,
            statuses,
            batch_id: self.batch_id,
            teacher_email: self.teacher_email,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub scheduled_date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub status: SessionStatus,
    /// `false` when the class was already in the requested state.
    pub changed: bool,
}

impl From<TransitionOutcome> for TransitionResponse {
    fn from(outcome: TransitionOutcome) -> Self {
        TransitionResponse {
            status: outcome.status(),
            changed: matches!(outcome, TransitionOutcome::Applied(_)),
        }
    }
}

#[axum::debug_handler(state = Arc<ApiState>)]
pub async fn create_session(
    State(state): State<Arc<ApiState>>,
    user: PortalUser,
    Json(payload): Json<NewSession>,
) -> Result<(StatusCode, Json<Session>), AppError> {
    let session = state.lifecycle.create_session(payload, &user.actor()).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[axum::debug_handler(state = Arc<ApiState>)]
pub async fn list_sessions(
    State(state): State<Arc<ApiState>>,
    _user: PortalUser,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<Vec<Session>>, AppError> {
    let filter = query.into_filter()?;
    Ok(Json(state.lifecycle.list_sessions(&filter).await?))
}

#[axum::debug_handler(state = Arc<ApiState>)]
pub async fn get_session(
    State(state): State<Arc<ApiState>>,
    _user: PortalUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Session>, AppError> {
    Ok(Json(state.lifecycle.get_session(id).await?))
}

#[axum::debug_handler(state = Arc<ApiState>)]
pub async fn reschedule_session(
    State(state): State<Arc<ApiState>>,
    user: PortalUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RescheduleRequest>,
) -> Result<Json<Session>, AppError> {
    let target = LifecycleTarget::Session(id);
    state
        .lifecycle
        .reschedule(
            &target,
            payload.scheduled_date,
            payload.start_time,
            payload.duration_minutes,
            &user.actor(),
        )
        .await?;
    Ok(Json(state.lifecycle.get_session(id).await?))
}

#[axum::debug_handler(state = Arc<ApiState>)]
pub async fn start_session(
    State(state): State<Arc<ApiState>>,
    user: PortalUser,
    Path(id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, AppError> {
    let outcome = state
        .lifecycle
        .go_live(&LifecycleTarget::Session(id), &user.actor())
        .await?;
    Ok(Json(outcome.into()))
}

#[axum::debug_handler(state = Arc<ApiState>)]
pub async fn end_session(
    State(state): State<Arc<ApiState>>,
    user: PortalUser,
    Path(id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, AppError> {
    let outcome = state.lifecycle.end(&LifecycleTarget::Session(id), &user.actor()).await?;
    Ok(Json(outcome.into()))
}

#[axum::debug_handler(state = Arc<ApiState>)]
pub async fn cancel_session(
    State(state): State<Arc<ApiState>>,
    user: PortalUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<CancelRequest>>,
) -> Result<Json<TransitionResponse>, AppError> {
    let reason = payload.and_then(|Json(body)| body.reason);
    let outcome = state
        .lifecycle
        .cancel(&LifecycleTarget::Session(id), &user.actor(), reason)
        .await?;
    Ok(Json(outcome.into()))
}

#[axum::debug_handler(state = Arc<ApiState>)]
pub async fn session_events(
    State(state): State<Arc<ApiState>>,
    _user: PortalUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<RoomEvent>>, AppError> {
    Ok(Json(state.lifecycle.events(&LifecycleTarget::Session(id)).await?))
}
