use axum::http::StatusCode;
use chrono::{Duration, Utc};
use liveclass_api::middleware::auth::{issue_portal_token, verify_portal_token};
use liveclass_api::middleware::error_handling::{map_error, AppError};
use liveclass_core::errors::ClassError;
use liveclass_core::models::{PortalIdentity, Role, SessionStatus};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn at() -> chrono::DateTime<Utc> {
    Utc::now()
}

#[rstest]
#[case::validation(ClassError::Validation("bad".into()), StatusCode::BAD_REQUEST)]
#[case::conflict(ClassError::conflict("session", SessionStatus::Ended), StatusCode::CONFLICT)]
#[case::not_found(ClassError::NotFound("room".into()), StatusCode::NOT_FOUND)]
#[case::gone(ClassError::Gone(SessionStatus::Cancelled), StatusCode::GONE)]
#[case::too_early(ClassError::TooEarly(at()), StatusCode::FORBIDDEN)]
#[case::not_live(ClassError::NotLive, StatusCode::FORBIDDEN)]
#[case::expired(ClassError::Expired(at()), StatusCode::FORBIDDEN)]
#[case::class_ended(ClassError::ClassEnded(at()), StatusCode::FORBIDDEN)]
#[case::payment(ClassError::PaymentRequired("unpaid".into()), StatusCode::PAYMENT_REQUIRED)]
#[case::authentication(ClassError::AuthenticationRequired, StatusCode::UNAUTHORIZED)]
#[case::forbidden(ClassError::Forbidden("no".into()), StatusCode::FORBIDDEN)]
#[case::upstream(ClassError::Upstream("down".into()), StatusCode::BAD_GATEWAY)]
#[case::database(ClassError::Database(eyre::eyre!("pool closed")), StatusCode::INTERNAL_SERVER_ERROR)]
#[case::internal(ClassError::Internal("bug".into()), StatusCode::INTERNAL_SERVER_ERROR)]
fn test_error_status_mapping(#[case] error: ClassError, #[case] expected: StatusCode) {
    assert_eq!(AppError(error).status(), expected);
}

#[test_log::test(tokio::test)]
async fn test_error_body_carries_code_and_hides_database_detail() {
    let response = map_error(ClassError::Database(eyre::eyre!("password authentication failed")));
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], "DATABASE");
    assert_eq!(body["error"], "Database error");
}

#[tokio::test]
async fn test_gate_errors_share_status_but_not_code() {
    let not_live = map_error(ClassError::NotLive);
    let bytes = axum::body::to_bytes(not_live.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(body["code"], "NOT_LIVE");
    assert_eq!(body["error"], "Class has not started yet");
}

fn identity() -> PortalIdentity {
    PortalIdentity {
        email: "coord@school.org".to_string(),
        name: "Coordinator".to_string(),
        role: Role::Coordinator,
    }
}

#[test]
fn test_portal_token_round_trip() {
    let token = issue_portal_token("secret", &identity(), Duration::minutes(5)).unwrap();

    assert_eq!(verify_portal_token("secret", &token).unwrap(), identity());
}

#[rstest]
#[case::wrong_secret("other-secret", Duration::minutes(5))]
#[case::expired("secret", Duration::minutes(-10))]
fn test_portal_token_rejected(#[case] verify_with: &str, #[case] ttl: Duration) {
    let token = issue_portal_token("secret", &identity(), ttl).unwrap();

    let err = verify_portal_token(verify_with, &token).unwrap_err();

    assert!(matches!(err, ClassError::AuthenticationRequired));
}
