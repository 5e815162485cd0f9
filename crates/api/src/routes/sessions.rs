use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::{handlers, ApiState};

pub fn routes() -> Router<Arc<ApiState>> {
    Router::new()
        .route(
            "/api/sessions",
            post(handlers::sessions::create_session).get(handlers::sessions::list_sessions),
        )
        .route("/api/sessions/:id", get(handlers::sessions::get_session))
        .route("/api/sessions/:id/schedule", put(handlers::sessions::reschedule_session))
        .route("/api/sessions/:id/start", post(handlers::sessions::start_session))
        .route("/api/sessions/:id/end", post(handlers::sessions::end_session))
        .route("/api/sessions/:id/cancel", post(handlers::sessions::cancel_session))
        .route("/api/sessions/:id/events", get(handlers::sessions::session_events))
}
