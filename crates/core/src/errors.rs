use thiserror::Error;

use crate::models::SessionStatus;

#[derive(Error, Debug)]
pub enum ClassError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {what} is {current}")]
    Conflict { what: String, current: SessionStatus },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Room is no longer available: {0}")]
    Gone(SessionStatus),

    #[error("Too early: room opens at {0}")]
    TooEarly(chrono::DateTime<chrono::Utc>),

    #[error("Class has not started yet")]
    NotLive,

    #[error("Join window expired at {0}")]
    Expired(chrono::DateTime<chrono::Utc>),

    #[error("Class time ended at {0}")]
    ClassEnded(chrono::DateTime<chrono::Utc>),

    #[error("Payment required: {0}")]
    PaymentRequired(String),

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Upstream provider error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(#[from] eyre::Report),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ClassError {
    /// Stable machine-readable code surfaced to clients.
    pub fn code(&self) -> &'static str {
        match self {
            ClassError::Validation(_) => "VALIDATION",
            ClassError::Conflict { .. } => "CONFLICT",
            ClassError::NotFound(_) => "NOT_FOUND",
            ClassError::Gone(_) => "GONE",
            ClassError::TooEarly(_) => "TOO_EARLY",
            ClassError::NotLive => "NOT_LIVE",
            ClassError::Expired(_) => "EXPIRED",
            ClassError::ClassEnded(_) => "CLASS_ENDED",
            ClassError::PaymentRequired(_) => "PAYMENT_REQUIRED",
            ClassError::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            ClassError::Forbidden(_) => "FORBIDDEN",
            ClassError::Upstream(_) => "UPSTREAM_PROVIDER_ERROR",
            ClassError::Database(_) => "DATABASE",
            ClassError::Internal(_) => "INTERNAL",
        }
    }

    /// Gate and state-machine outcomes that happen routinely and are not
    /// logged as errors.
    pub fn is_expected(&self) -> bool {
        !matches!(
            self,
            ClassError::Upstream(_) | ClassError::Database(_) | ClassError::Internal(_)
        )
    }

    pub fn conflict(what: impl Into<String>, current: SessionStatus) -> Self {
        ClassError::Conflict {
            what: what.into(),
            current,
        }
    }
}

pub type ClassResult<T> = Result<T, ClassError>;
