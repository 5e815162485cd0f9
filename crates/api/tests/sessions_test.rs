mod common;

use axum::http::StatusCode;
use liveclass_core::models::{Role, SessionStatus};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use common::*;

#[tokio::test]
async fn test_create_session_requires_bearer_token() {
    let app = TestApp::at("09:00");

    let response = app.server.post("/api/sessions").json(&new_session_body("14:00", 60)).await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["code"], "AUTHENTICATION_REQUIRED");
}

#[tokio::test]
async fn test_create_session_as_student_is_forbidden() {
    let app = TestApp::at("09:00");

    let response = app
        .server
        .post("/api/sessions")
        .add_header(AUTHORIZATION, bearer(STUDENT, Role::Student))
        .json(&new_session_body("14:00", 60))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(response.json::<Value>()["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_create_and_get_session() {
    let app = TestApp::at("09:00");
    let created = app.schedule("14:00", 60).await;

    assert_eq!(created["status"], "scheduled");
    let room_name = created["video_room_name"].as_str().expect("room name");
    assert!(room_name.starts_with("class_20261019_1400_"));

    let id = created["session_id"].as_str().expect("id");
    let fetched = app
        .server
        .get(&format!("/api/sessions/{}", id))
        .add_header(AUTHORIZATION, bearer(TEACHER, Role::Teacher))
        .await;
    fetched.assert_status_ok();
    assert_eq!(fetched.json::<Value>(), created);

    let room = app
        .server
        .get(&format!("/api/rooms/{}", room_name))
        .add_header(AUTHORIZATION, bearer(TEACHER, Role::Teacher))
        .await
        .json::<Value>();
    assert_eq!(room["open_at"], json!(local(DAY, "13:45")));
    assert_eq!(room["expires_at"], json!(local(DAY, "15:15")));
}

#[tokio::test]
async fn test_get_unknown_session_is_not_found() {
    let app = TestApp::at("09:00");

    let response = app
        .server
        .get("/api/sessions/00000000-0000-0000-0000-000000000001")
        .add_header(AUTHORIZATION, bearer(TEACHER, Role::Teacher))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_sessions_filters_by_status() {
    let app = TestApp::at("09:00");
    let first = app.schedule("14:00", 60).await;
    app.schedule("16:00", 60).await;

    let id = first["session_id"].as_str().expect("id");
    app.server
        .post(&format!("/api/sessions/{}/cancel", id))
        .add_header(AUTHORIZATION, bearer(COORDINATOR, Role::Coordinator))
        .json(&json!({ "reason": "teacher unwell" }))
        .await
        .assert_status_ok();

    let scheduled = app
        .server
        .get("/api/sessions")
        .add_query_param("status", "scheduled,live")
        .add_header(AUTHORIZATION, bearer(COORDINATOR, Role::Coordinator))
        .await
        .json::<Vec<Value>>();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0]["start_time"], "16:00:00");

    let all = app
        .server
        .get("/api/sessions")
        .add_query_param("from", DAY)
        .add_query_param("to", DAY)
        .add_header(AUTHORIZATION, bearer(COORDINATOR, Role::Coordinator))
        .await
        .json::<Vec<Value>>();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_list_sessions_rejects_unknown_status() {
    let app = TestApp::at("09:00");

    let response = app
        .server
        .get("/api/sessions")
        .add_query_param("status", "paused")
        .add_header(AUTHORIZATION, bearer(COORDINATOR, Role::Coordinator))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "VALIDATION");
}

#[tokio::test]
async fn test_start_end_and_repeat_transitions() {
    let app = TestApp::at("13:50");
    let created = app.schedule("14:00", 60).await;
    let id = created["session_id"].as_str().expect("id");

    let started = app
        .server
        .post(&format!("/api/sessions/{}/start", id))
        .add_header(AUTHORIZATION, bearer(TEACHER, Role::Teacher))
        .await
        .json::<Value>();
    assert_eq!(started, json!({ "status": "live", "changed": true }));

    let again = app
        .server
        .post(&format!("/api/sessions/{}/start", id))
        .add_header(AUTHORIZATION, bearer(TEACHER, Role::Teacher))
        .await
        .json::<Value>();
    assert_eq!(again, json!({ "status": "live", "changed": false }));

    let ended = app
        .server
        .post(&format!("/api/sessions/{}/end", id))
        .add_header(AUTHORIZATION, bearer(TEACHER, Role::Teacher))
        .await
        .json::<Value>();
    assert_eq!(ended["status"], "ended");

    let restart = app
        .server
        .post(&format!("/api/sessions/{}/start", id))
        .add_header(AUTHORIZATION, bearer(TEACHER, Role::Teacher))
        .await;
    restart.assert_status(StatusCode::CONFLICT);
    assert_eq!(restart.json::<Value>()["code"], "CONFLICT");

    let events = app
        .server
        .get(&format!("/api/sessions/{}/events", id))
        .add_header(AUTHORIZATION, bearer(COORDINATOR, Role::Coordinator))
        .await
        .json::<Vec<Value>>();
    let types: Vec<&str> = events.iter().filter_map(|e| e["event_type"].as_str()).collect();
    assert_eq!(types, vec!["created", "went_live", "ended"]);
}

#[tokio::test]
async fn test_teacher_cannot_cancel() {
    let app = TestApp::at("09:00");
    let created = app.schedule("14:00", 60).await;
    let id = created["session_id"].as_str().expect("id");

    let response = app
        .server
        .post(&format!("/api/sessions/{}/cancel", id))
        .add_header(AUTHORIZATION, bearer(TEACHER, Role::Teacher))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_reschedule_moves_windows() {
    let app = TestApp::at("09:00");
    let created = app.schedule("14:00", 60).await;
    let id = created["session_id"].as_str().expect("id");

    let response = app
        .server
        .put(&format!("/api/sessions/{}/schedule", id))
        .add_header(AUTHORIZATION, bearer(COORDINATOR, Role::Coordinator))
        .json(&json!({ "scheduled_date": DAY, "start_time": "15:30:00", "duration_minutes": 45 }))
        .await;
    response.assert_status_ok();
    let moved = response.json::<Value>();
    assert_eq!(moved["start_time"], "15:30:00");
    assert_eq!(moved["duration_minutes"], 45);

    let room = app
        .engine
        .lifecycle()
        .get_room(created["video_room_name"].as_str().expect("room"))
        .await
        .unwrap();
    assert_eq!(room.open_at, local(DAY, "15:15"));
    assert_eq!(room.expires_at, local(DAY, "16:30"));
    assert_eq!(room.status, SessionStatus::Scheduled);
}
