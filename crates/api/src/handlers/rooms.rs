use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use liveclass_core::errors::ClassError;
use liveclass_core::models::{
    CallerCredential, Device, JoinRequest, JoinTicket, LifecycleTarget, NewRoom, ReminderCounts, Role, Room,
};
use liveclass_core::ports::AttendanceKind;
use serde::Deserialize;

use super::sessions::{CancelRequest, TransitionResponse};
use crate::middleware::auth::{MaybePortalUser, PortalUser, WebhookCaller};
use crate::middleware::error_handling::AppError;
use crate::ApiState;

#[derive(Debug, Default, Deserialize)]
pub struct JoinBody {
    pub invite_token: Option<String>,
    /// Role to take instead of the native one (observer mode).
    pub role: Option<Role>,
    #[serde(default)]
    pub device: Device,
}

#[derive(Debug, Deserialize)]
pub struct AttendanceBody {
    pub participant_email: String,
    pub kind: AttendanceKind,
}

#[axum::debug_handler(state = Arc<ApiState>)]
pub async fn create_room(
    State(state): State<Arc<ApiState>>,
    user: PortalUser,
    Json(payload): Json<NewRoom>,
) -> Result<(StatusCode, Json<Room>), AppError> {
    let room = state.lifecycle.create_room(payload, &user.actor()).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

#[axum::debug_handler(state = Arc<ApiState>)]
pub async fn get_room(
    State(state): State<Arc<ApiState>>,
    _user: PortalUser,
    Path(room_id): Path<String>,
) -> Result<Json<Room>, AppError> {
    Ok(Json(state.lifecycle.get_room(&room_id).await?))
}

#[axum::debug_handler(state = Arc<ApiState>)]
pub async fn start_room(
    State(state): State<Arc<ApiState>>,
    user: PortalUser,
    Path(room_id): Path<String>,
) -> Result<Json<TransitionResponse>, AppError> {
    let outcome = state
        .lifecycle
        .go_live(&LifecycleTarget::Room(room_id), &user.actor())
        .await?;
    Ok(Json(outcome.into()))
}

#[axum::debug_handler(state = Arc<ApiState>)]
pub async fn end_room(
    State(state): State<Arc<ApiState>>,
    user: PortalUser,
    Path(room_id): Path<String>,
) -> Result<Json<TransitionResponse>, AppError> {
    let outcome = state
        .lifecycle
        .end(&LifecycleTarget::Room(room_id), &user.actor())
        .await?;
    Ok(Json(outcome.into()))
}

#[axum::debug_handler(state = Arc<ApiState>)]
pub async fn cancel_room(
    State(state): State<Arc<ApiState>>,
    user: PortalUser,
    Path(room_id): Path<String>,
    payload: Option<Json<CancelRequest>>,
) -> Result<Json<TransitionResponse>, AppError> {
    let reason = payload.and_then(|Json(body)| body.reason);
    let outcome = state
        .lifecycle
        .cancel(&LifecycleTarget::Room(room_id), &user.actor(), reason)
        .await?;
    Ok(Json(outcome.into()))
}

/// Issues a join credential. The caller is identified by a portal bearer
/// token, or else by the invite token in the body.
#[axum::debug_handler(state = Arc<ApiState>)]
pub async fn join_room(
    State(state): State<Arc<ApiState>>,
    MaybePortalUser(identity): MaybePortalUser,
    Path(room_id): Path<String>,
    payload: Option<Json<JoinBody>>,
) -> Result<Json<JoinTicket>, AppError> {
    let body = payload.map(|Json(body)| body).unwrap_or_default();
    let credential = match (identity, body.invite_token) {
        (Some(identity), _) => CallerCredential::Session(identity),
        (None, Some(token)) if !token.trim().is_empty() => CallerCredential::InviteToken(token.trim().to_string()),
        (None, _) => CallerCredential::Anonymous,
    };

    let ticket = state
        .join
        .authorize(JoinRequest {
            room_id,
            credential,
            requested_role: body.role,
            device: body.device,
        })
        .await?;
    Ok(Json(ticket))
}

#[axum::debug_handler(state = Arc<ApiState>)]
pub async fn reminder_status(
    State(state): State<Arc<ApiState>>,
    _user: PortalUser,
    Path(room_id): Path<String>,
) -> Result<Json<ReminderCounts>, AppError> {
    Ok(Json(state.reminders.status_for_room(&room_id).await?))
}

/// Participant joined or left, reported by the video provider webhook.
#[axum::debug_handler(state = Arc<ApiState>)]
pub async fn record_attendance(
    State(state): State<Arc<ApiState>>,
    _caller: WebhookCaller,
    Path(room_id): Path<String>,
    Json(payload): Json<AttendanceBody>,
) -> Result<StatusCode, AppError> {
    let email = payload.participant_email.trim().to_lowercase();
    if email.is_empty() {
        return Err(ClassError::Validation("participant_email is required".into()).into());
    }
    if state.engine.store.get_room(&room_id).await?.is_none() {
        return Err(ClassError::NotFound(format!("room {}", room_id)).into());
    }

    let now = state.engine.clock.now();
    state
        .engine
        .store
        .record_attendance(&room_id, &email, payload.kind, now)
        .await?;
    tracing::debug!(room_id = %room_id, email = %email, kind = ?payload.kind, "Recorded attendance");
    Ok(StatusCode::NO_CONTENT)
}
