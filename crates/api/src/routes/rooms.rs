use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::{handlers, ApiState};

pub fn routes() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/api/rooms", post(handlers::rooms::create_room))
        .route("/api/rooms/:room_id", get(handlers::rooms::get_room))
        .route("/api/rooms/:room_id/start", post(handlers::rooms::start_room))
        .route("/api/rooms/:room_id/end", post(handlers::rooms::end_room))
        .route("/api/rooms/:room_id/cancel", post(handlers::rooms::cancel_room))
        .route("/api/rooms/:room_id/join", post(handlers::rooms::join_room))
        .route("/api/rooms/:room_id/reminders", get(handlers::rooms::reminder_status))
        .route("/api/rooms/:room_id/attendance", post(handlers::rooms::record_attendance))
}
