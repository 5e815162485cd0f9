use axum::{routing::post, Router};
use std::sync::Arc;

use crate::{handlers, ApiState};

pub fn routes() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/api/cron/auto-start", post(handlers::cron::auto_start))
        .route("/api/cron/reminders", post(handlers::cron::reminders))
        .route("/api/cron/sweep", post(handlers::cron::sweep))
}
