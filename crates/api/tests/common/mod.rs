#![allow(dead_code)]

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum_test::TestServer;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use liveclass_api::middleware::auth::issue_portal_token;
use liveclass_api::{build_router, ApiState, AuthSettings};
use liveclass_core::config::EngineConfig;
use liveclass_core::mock::MockEngine;
use liveclass_core::models::{BatchMember, PaymentStatus, PortalIdentity, Role};
use liveclass_core::windows::resolve_local;
use serde_json::{json, Value};
use uuid::Uuid;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const CRON_SECRET: &str = "test-cron-secret";
pub const DAY: &str = "2026-10-19";
pub const TEACHER: &str = "teacher@school.org";
pub const COORDINATOR: &str = "coord@school.org";
pub const STUDENT: &str = "asha@students.org";

pub fn batch_id() -> Uuid {
    Uuid::from_u128(0x4242)
}

/// Instant of a wall-clock reading in the default portal timezone.
pub fn local(day: &str, hh_mm: &str) -> DateTime<Utc> {
    let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").expect("date");
    let time = NaiveTime::parse_from_str(hh_mm, "%H:%M").expect("time");
    resolve_local(EngineConfig::default().timezone, date.and_time(time)).expect("valid local time")
}

pub struct TestApp {
    pub engine: MockEngine,
    pub server: TestServer,
}

impl TestApp {
    /// Server over the in-memory engine with the clock at `hh_mm` on [`DAY`].
    pub fn at(hh_mm: &str) -> Self {
        Self::with_cron_secret(hh_mm, Some(CRON_SECRET))
    }

    pub fn with_cron_secret(hh_mm: &str, cron_secret: Option<&str>) -> Self {
        let engine = MockEngine::new(EngineConfig::default(), local(DAY, hh_mm)).expect("engine");
        let auth = AuthSettings {
            jwt_secret: JWT_SECRET.to_string(),
            cron_secret: cron_secret.map(str::to_string),
        };
        let state = Arc::new(ApiState::new(engine.ctx.clone(), auth));
        let server = TestServer::new(build_router(state)).expect("test server");
        Self { engine, server }
    }

    pub fn seed_batch(&self) {
        for (email, role, payment_status) in [
            (STUDENT, Role::Student, PaymentStatus::Paid),
            ("ben@students.org", Role::Student, PaymentStatus::Overdue),
            (COORDINATOR, Role::Coordinator, PaymentStatus::Exempt),
        ] {
            self.engine.store.add_batch_member(
                batch_id(),
                BatchMember {
                    email: email.to_string(),
                    name: email.to_string(),
                    role,
                    payment_status,
                },
            );
        }
    }

    /// Schedules a class on [`DAY`] as the coordinator and returns the
    /// session body.
    pub async fn schedule(&self, start: &str, duration_minutes: i32) -> Value {
        let response = self
            .server
            .post("/api/sessions")
            .add_header(AUTHORIZATION, bearer(COORDINATOR, Role::Coordinator))
            .json(&new_session_body(start, duration_minutes))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        response.json::<Value>()
    }
}

pub const AUTHORIZATION: HeaderName = axum::http::header::AUTHORIZATION;

pub fn cron_header() -> HeaderName {
    HeaderName::from_static(liveclass_api::middleware::auth::CRON_SECRET_HEADER)
}

pub fn token(email: &str, role: Role) -> String {
    let identity = PortalIdentity {
        email: email.to_string(),
        name: email.to_string(),
        role,
    };
    issue_portal_token(JWT_SECRET, &identity, chrono::Duration::hours(1)).expect("token")
}

pub fn bearer(email: &str, role: Role) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token(email, role))).expect("header value")
}

pub fn new_session_body(start: &str, duration_minutes: i32) -> Value {
    json!({
        "batch_id": batch_id(),
        "subject": "Physics",
        "teacher_email": TEACHER,
        "teacher_name": "Ms. Rao",
        "scheduled_date": DAY,
        "start_time": format!("{}:00", start),
        "duration_minutes": duration_minutes,
        "teaching_minutes": null,
        "prep_buffer_minutes": null,
        "max_participants": null,
    })
}
