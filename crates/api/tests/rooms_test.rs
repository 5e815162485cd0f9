mod common;

use axum::http::StatusCode;
use chrono::Utc;
use liveclass_core::models::{Assignment, LifecycleTarget, PaymentStatus, Role, SessionStatus};
use liveclass_core::ports::SessionStore;
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{json, Value};
use uuid::Uuid;

use common::*;

/// Seeds the batch, schedules a 14:00 class of 90 minutes and returns its room id.
async fn class(app: &TestApp) -> String {
    app.seed_batch();
    let session = app.schedule("14:00", 90).await;
    session["video_room_name"].as_str().expect("room name").to_string()
}

async fn go_live(app: &TestApp, room_id: &str) {
    app.engine
        .lifecycle()
        .go_live(
            &LifecycleTarget::Room(room_id.to_string()),
            &liveclass_core::models::Actor::person(COORDINATOR, Role::Coordinator),
        )
        .await
        .unwrap();
}

fn invite(room_id: &str, email: &str, role: Role, token: &str) -> Assignment {
    Assignment {
        id: Uuid::new_v4(),
        room_id: room_id.to_string(),
        participant_email: email.to_string(),
        participant_name: "Asha".to_string(),
        participant_type: role,
        payment_status: PaymentStatus::Paid,
        join_token: Some(token.to_string()),
        token_redeemed_at: None,
        joined_at: None,
        left_at: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_create_standalone_room() {
    let app = TestApp::at("09:00");

    let response = app
        .server
        .post("/api/rooms")
        .add_header(AUTHORIZATION, bearer(COORDINATOR, Role::Coordinator))
        .json(&json!({
            "room_name": "Doubt clearing",
            "subject": "Maths",
            "teacher_email": TEACHER,
            "teacher_name": "Ms. Rao",
            "scheduled_start": local(DAY, "17:00"),
            "duration_minutes": 30,
            "max_participants": 20,
            "batch_id": null,
        }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let room = response.json::<Value>();
    assert_eq!(room["status"], "scheduled");
    assert_eq!(room["session_id"], Value::Null);
    assert_eq!(room["open_at"], json!(local(DAY, "16:45")));
}

#[tokio::test]
async fn test_join_without_credentials_is_unauthorized() {
    let app = TestApp::at("12:00");
    let room_id = class(&app).await;

    let response = app.server.post(&format!("/api/rooms/{}/join", room_id)).await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_join_with_invalid_bearer_is_unauthorized() {
    let app = TestApp::at("12:00");
    let room_id = class(&app).await;

    let response = app
        .server
        .post(&format!("/api/rooms/{}/join", room_id))
        .add_header(AUTHORIZATION, axum::http::HeaderValue::from_static("Bearer not-a-token"))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[rstest]
#[case::not_live("13:50", false, StatusCode::FORBIDDEN, "NOT_LIVE")]
#[case::too_early("13:30", true, StatusCode::FORBIDDEN, "TOO_EARLY")]
#[case::class_ended("15:35", true, StatusCode::FORBIDDEN, "CLASS_ENDED")]
#[tokio::test]
async fn test_student_join_gates(
    #[case] now: &str,
    #[case] live: bool,
    #[case] status: StatusCode,
    #[case] code: &str,
) {
    let app = TestApp::at("12:00");
    let room_id = class(&app).await;
    if live {
        go_live(&app, &room_id).await;
    }
    app.engine.clock.set(local(DAY, now));

    let response = app
        .server
        .post(&format!("/api/rooms/{}/join", room_id))
        .add_header(AUTHORIZATION, bearer(STUDENT, Role::Student))
        .json(&json!({}))
        .await;

    response.assert_status(status);
    assert_eq!(response.json::<Value>()["code"], code);
}

#[tokio::test]
async fn test_student_joins_live_room_with_session_token() {
    let app = TestApp::at("12:00");
    let room_id = class(&app).await;
    go_live(&app, &room_id).await;
    app.engine.clock.set(local(DAY, "14:05"));

    let response = app
        .server
        .post(&format!("/api/rooms/{}/join", room_id))
        .add_header(AUTHORIZATION, bearer(STUDENT, Role::Student))
        .await;

    response.assert_status_ok();
    let ticket = response.json::<Value>();
    assert_eq!(ticket["identity"], format!("student_{}", STUDENT));
    assert_eq!(ticket["effective_role"], "student");
    assert_eq!(ticket["status"], "live");
    assert_eq!(ticket["is_rejoin"], false);
    assert_eq!(app.engine.video.minted().len(), 1);
}

#[tokio::test]
async fn test_overdue_student_needs_payment() {
    let app = TestApp::at("12:00");
    let room_id = class(&app).await;
    go_live(&app, &room_id).await;
    app.engine.clock.set(local(DAY, "14:05"));

    let response = app
        .server
        .post(&format!("/api/rooms/{}/join", room_id))
        .add_header(AUTHORIZATION, bearer("ben@students.org", Role::Student))
        .await;

    response.assert_status(StatusCode::PAYMENT_REQUIRED);
}

#[tokio::test]
async fn test_join_of_cancelled_room_is_gone() {
    let app = TestApp::at("12:00");
    let room_id = class(&app).await;
    app.engine.store.set_room_status(&room_id, SessionStatus::Cancelled);

    let response = app
        .server
        .post(&format!("/api/rooms/{}/join", room_id))
        .add_header(AUTHORIZATION, bearer(TEACHER, Role::Teacher))
        .await;

    response.assert_status(StatusCode::GONE);
    assert_eq!(response.json::<Value>()["code"], "GONE");
}

#[tokio::test]
async fn test_invite_token_is_single_use() {
    let app = TestApp::at("12:00");
    let room_id = class(&app).await;
    go_live(&app, &room_id).await;
    app.engine.clock.set(local(DAY, "14:05"));
    let token = "InviteToken0123456789abcdefghijk";
    app.engine
        .store
        .put_assignment(invite(&room_id, STUDENT, Role::Student, token));

    let first = app
        .server
        .post(&format!("/api/rooms/{}/join", room_id))
        .json(&json!({ "invite_token": token }))
        .await;
    first.assert_status_ok();
    assert_eq!(first.json::<Value>()["participant_email"], STUDENT);

    let second = app
        .server
        .post(&format!("/api/rooms/{}/join", room_id))
        .json(&json!({ "invite_token": token }))
        .await;
    second.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_coordinator_joins_as_observer_before_live() {
    let app = TestApp::at("12:00");
    let room_id = class(&app).await;
    app.engine.clock.set(local(DAY, "13:50"));

    let response = app
        .server
        .post(&format!("/api/rooms/{}/join", room_id))
        .add_header(AUTHORIZATION, bearer(COORDINATOR, Role::Coordinator))
        .json(&json!({ "role": "observer" }))
        .await;

    response.assert_status_ok();
    let ticket = response.json::<Value>();
    assert_eq!(ticket["role"], "coordinator");
    assert_eq!(ticket["effective_role"], "observer");
    assert_eq!(ticket["status"], "scheduled");
}

#[tokio::test]
async fn test_attendance_marks_rejoin() {
    let app = TestApp::at("12:00");
    let room_id = class(&app).await;
    go_live(&app, &room_id).await;
    app.engine.clock.set(local(DAY, "14:05"));

    app.server
        .post(&format!("/api/rooms/{}/attendance", room_id))
        .add_header(cron_header(), axum::http::HeaderValue::from_static(CRON_SECRET))
        .json(&json!({ "participant_email": "Asha@Students.org", "kind": "joined" }))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    assert_eq!(app.engine.store.attendance_join_count(&room_id, STUDENT).await.unwrap(), 1);

    let ticket = app
        .server
        .post(&format!("/api/rooms/{}/join", room_id))
        .add_header(AUTHORIZATION, bearer(STUDENT, Role::Student))
        .await
        .json::<Value>();
    assert_eq!(ticket["is_rejoin"], true);
}

#[tokio::test]
async fn test_attendance_requires_cron_secret() {
    let app = TestApp::at("12:00");
    let room_id = class(&app).await;

    let response = app
        .server
        .post(&format!("/api/rooms/{}/attendance", room_id))
        .json(&json!({ "participant_email": STUDENT, "kind": "joined" }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_attendance_webhook_is_disabled_without_cron_secret() {
    let app = TestApp::with_cron_secret("12:00", None);
    let room_id = class(&app).await;

    let response = app
        .server
        .post(&format!("/api/rooms/{}/attendance", room_id))
        .add_header(cron_header(), axum::http::HeaderValue::from_static(CRON_SECRET))
        .json(&json!({ "participant_email": STUDENT, "kind": "joined" }))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(app.engine.store.attendance_join_count(&room_id, STUDENT).await.unwrap(), 0);

    // Trigger routes stay open in the same configuration.
    app.server
        .post("/api/cron/sweep")
        .await
        .assert_status(StatusCode::OK);
}

#[tokio::test]
async fn test_attendance_for_unknown_room_is_not_found() {
    let app = TestApp::at("12:00");

    let response = app
        .server
        .post("/api/rooms/class_missing/attendance")
        .add_header(cron_header(), axum::http::HeaderValue::from_static(CRON_SECRET))
        .json(&json!({ "participant_email": STUDENT, "kind": "left" }))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reminder_status_counts_ledger_rows() {
    let app = TestApp::at("12:00");
    let room_id = class(&app).await;
    app.engine.clock.set(local(DAY, "13:30"));
    app.engine.reminders().run().await;

    let counts = app
        .server
        .get(&format!("/api/rooms/{}/reminders", room_id))
        .add_header(AUTHORIZATION, bearer(COORDINATOR, Role::Coordinator))
        .await
        .json::<Value>();

    assert!(counts["sent"].as_i64().unwrap_or(0) > 0);
    assert_eq!(counts["failed"], 0);
    assert_eq!(counts["pending"], 0);
}
