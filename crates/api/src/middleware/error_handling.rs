//! # Error Handling Middleware
//!
//! Maps engine errors to HTTP status codes and a JSON body of the form
//! `{"error": message, "code": CODE}`. Clients branch on `code`; the time
//! gates in particular share a status but never a code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use liveclass_core::errors::ClassError;
use serde_json::json;

/// Application error wrapper that provides HTTP status code mapping
///
/// # Example
///
/// ```
/// use axum::Json;
/// use liveclass_api::middleware::error_handling::AppError;
/// use liveclass_core::errors::ClassError;
///
/// async fn handler(room_id: String) -> Result<Json<String>, AppError> {
///     if room_id.is_empty() {
///         return Err(ClassError::NotFound("room".into()).into());
///     }
///     Ok(Json(room_id))
/// }
/// # fn main() {}
/// ```
#[derive(Debug)]
pub struct AppError(pub ClassError);

impl AppError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ClassError::Validation(_) => StatusCode::BAD_REQUEST,
            ClassError::Conflict { .. } => StatusCode::CONFLICT,
            ClassError::NotFound(_) => StatusCode::NOT_FOUND,
            ClassError::Gone(_) => StatusCode::GONE,
            ClassError::TooEarly(_)
            | ClassError::NotLive
            | ClassError::Expired(_)
            | ClassError::ClassEnded(_)
            | ClassError::Forbidden(_) => StatusCode::FORBIDDEN,
            ClassError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            ClassError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ClassError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ClassError::Database(_) | ClassError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if self.0.is_expected() {
            tracing::debug!(code = self.0.code(), "Request rejected: {}", self.0);
        } else {
            tracing::error!(code = self.0.code(), "Request failed: {:?}", self.0);
        }

        // Infrastructure details stay in the log.
        let message = match &self.0 {
            ClassError::Database(_) => "Database error".to_string(),
            other => other.to_string(),
        };
        let body = Json(json!({ "error": message, "code": self.0.code() }));

        (status, body).into_response()
    }
}

/// Allows `?` on engine results inside handlers.
impl From<ClassError> for AppError {
    fn from(err: ClassError) -> Self {
        AppError(err)
    }
}

/// Wraps infrastructure failures in `ClassError::Database`.
impl From<eyre::Report> for AppError {
    fn from(err: eyre::Report) -> Self {
        AppError(ClassError::Database(err))
    }
}

/// Maps a ClassError to an HTTP response
pub fn map_error(err: ClassError) -> Response {
    AppError(err).into_response()
}
