#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use liveclass_core::config::EngineConfig;
use liveclass_core::mock::MockEngine;
use liveclass_core::models::{Actor, BatchMember, NewSession, PaymentStatus, Role, Session};
use liveclass_core::windows::resolve_local;
use uuid::Uuid;

pub const DAY: &str = "2026-10-19";
pub const TEACHER: &str = "teacher@school.org";
pub const COORDINATOR: &str = "coord@school.org";

pub fn batch_id() -> Uuid {
    Uuid::from_u128(0x4242)
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
}

pub fn time(s: &str) -> NaiveTime {
    NaiveTime::parse_from_str(s, "%H:%M").expect("time")
}

/// Instant of a wall-clock reading in the default portal timezone.
pub fn local(day: &str, hh_mm: &str) -> DateTime<Utc> {
    let config = EngineConfig::default();
    resolve_local(config.timezone, date(day).and_time(time(hh_mm))).expect("valid local time")
}

pub fn engine_at(hh_mm: &str) -> MockEngine {
    MockEngine::new(EngineConfig::default(), local(DAY, hh_mm)).expect("engine")
}

pub fn coordinator() -> Actor {
    Actor::person(COORDINATOR, Role::Coordinator)
}

pub fn new_session(start: &str, duration_minutes: i32) -> NewSession {
    NewSession {
        batch_id: batch_id(),
        subject: "Physics".to_string(),
        teacher_email: TEACHER.to_string(),
        teacher_name: "Ms. Rao".to_string(),
        scheduled_date: date(DAY),
        start_time: time(start),
        duration_minutes,
        teaching_minutes: None,
        prep_buffer_minutes: None,
        max_participants: None,
    }
}

pub fn member(email: &str, role: Role, payment_status: PaymentStatus) -> BatchMember {
    BatchMember {
        email: email.to_string(),
        name: email.split('@').next().unwrap_or(email).to_string(),
        role,
        payment_status,
    }
}

/// Two students, one parent, a coordinator and an academic operator.
pub fn seed_batch(engine: &MockEngine) {
    for m in [
        member("asha@students.org", Role::Student, PaymentStatus::Paid),
        member("ben@students.org", Role::Student, PaymentStatus::Exempt),
        member("parent.asha@home.org", Role::Parent, PaymentStatus::Paid),
        member(COORDINATOR, Role::Coordinator, PaymentStatus::Exempt),
        member("ops@school.org", Role::AcademicOperator, PaymentStatus::Exempt),
    ] {
        engine.store.add_batch_member(batch_id(), m);
    }
}

pub const BATCH_RECIPIENTS: usize = 6;

pub async fn schedule(engine: &MockEngine, start: &str, duration_minutes: i32) -> Session {
    engine
        .lifecycle()
        .create_session(new_session(start, duration_minutes), &coordinator())
        .await
        .expect("session created")
}
