use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use liveclass_core::errors::ClassError;
use liveclass_core::models::{Assignment, BatchMember, PaymentStatus, Role, Room, Session, SessionStatus};
use liveclass_db::models::{DbAssignment, DbBatchMember, DbLedgerRow, DbRoom, DbSession, LedgerStatus};
use pretty_assertions::assert_eq;
use rstest::rstest;
use uuid::Uuid;

fn db_session(status: &str) -> DbSession {
    DbSession {
        session_id: Uuid::from_u128(1),
        batch_id: Uuid::from_u128(2),
        subject: "Physics".to_string(),
        teacher_email: "teacher@school.org".to_string(),
        teacher_name: "R. Iyer".to_string(),
        scheduled_date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
        start_time: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
        duration_minutes: 90,
        teaching_minutes: 80,
        prep_buffer_minutes: 15,
        status: status.to_string(),
        video_room_name: "class_20261019_1400_ab12cd".to_string(),
        started_at: None,
        ended_at: None,
        cancelled_at: None,
        cancel_reason: None,
        created_by: "coord@school.org".to_string(),
        created_at: Utc.with_ymd_and_hms(2026, 10, 1, 6, 0, 0).unwrap(),
    }
}

fn db_room(status: &str) -> DbRoom {
    let start = Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap();
    DbRoom {
        room_id: "class_20261019_1400_ab12cd".to_string(),
        room_name: "Physics".to_string(),
        subject: "Physics".to_string(),
        teacher_email: "teacher@school.org".to_string(),
        status: status.to_string(),
        scheduled_start: start,
        duration_minutes: 90,
        open_at: start - chrono::Duration::minutes(15),
        expires_at: start + chrono::Duration::minutes(105),
        max_participants: 60,
        batch_id: Some(Uuid::from_u128(2)),
        session_id: Some(Uuid::from_u128(1)),
        created_by: "coord@school.org".to_string(),
        created_at: start,
        started_at: None,
        ended_at: None,
    }
}

#[test]
fn test_session_row_converts() {
    let session = Session::try_from(db_session("live")).unwrap();

    assert_eq!(session.status, SessionStatus::Live);
    assert_eq!(session.teaching_minutes, 80);
    assert_eq!(session.local_start().to_string(), "2026-10-19 14:00:00");
}

#[test]
fn test_room_row_converts() {
    let room = Room::try_from(db_room("scheduled")).unwrap();

    assert_eq!(room.status, SessionStatus::Scheduled);
    assert!(room.open_at < room.scheduled_start && room.scheduled_start < room.expires_at);
}

#[rstest]
#[case::session_status(Session::try_from(db_session("paused")).err())]
#[case::room_status(Room::try_from(db_room("LIVE")).err())]
fn test_unknown_stored_status_is_a_database_fault(#[case] error: Option<ClassError>) {
    let error = error.expect("conversion should fail");
    assert_eq!(error.code(), "DATABASE");
    assert!(error.to_string().contains("status"));
}

#[test]
fn test_assignment_row_converts_roles_and_payment() {
    let row = DbAssignment {
        id: Uuid::from_u128(7),
        room_id: "class_x".to_string(),
        participant_email: "parent.asha@home.in".to_string(),
        participant_name: "Asha's parent".to_string(),
        participant_type: "parent".to_string(),
        payment_status: "overdue".to_string(),
        join_token: Some("t".repeat(32)),
        token_redeemed_at: None,
        joined_at: None,
        left_at: None,
        created_at: Utc::now(),
    };

    let assignment = Assignment::try_from(row).unwrap();

    assert_eq!(assignment.participant_type, Role::Parent);
    assert_eq!(assignment.payment_status, PaymentStatus::Overdue);
    assert!(assignment.payment_status.blocks_join());
}

#[test]
fn test_batch_member_row_drops_parent_link() {
    let row = DbBatchMember {
        batch_id: Uuid::from_u128(2),
        email: "parent.asha@home.in".to_string(),
        name: "Asha's parent".to_string(),
        role: "parent".to_string(),
        payment_status: "paid".to_string(),
        linked_student_email: Some("asha@home.in".to_string()),
    };

    assert_eq!(
        BatchMember::try_from(row).unwrap(),
        BatchMember {
            email: "parent.asha@home.in".to_string(),
            name: "Asha's parent".to_string(),
            role: Role::Parent,
            payment_status: PaymentStatus::Paid,
        }
    );
}

#[rstest]
#[case("pending", LedgerStatus::Pending)]
#[case("sent", LedgerStatus::Sent)]
#[case("failed", LedgerStatus::Failed)]
fn test_ledger_status(#[case] stored: &str, #[case] expected: LedgerStatus) {
    let row = DbLedgerRow {
        id: Uuid::new_v4(),
        recipient: "asha@home.in".to_string(),
        template_type: "class_reminder".to_string(),
        dedup_key: "session:1:30".to_string(),
        day: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
        status: stored.to_string(),
        claimed_at: Utc::now(),
        completed_at: None,
        external_message_id: None,
        error: None,
    };

    assert_eq!(row.ledger_status().unwrap(), expected);
    assert_eq!(expected.as_str(), stored);
}
