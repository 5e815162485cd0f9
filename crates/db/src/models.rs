use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use eyre::eyre;
use liveclass_core::errors::ClassError;
use liveclass_core::models::{
    Assignment, BatchMember, PaymentStatus, Role, Room, RoomEvent, Session, SessionStatus,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Parses a text column into its enum, treating an unknown value as a
/// storage fault rather than a caller error.
fn parse_column<T: FromStr>(column: &str, value: &str) -> Result<T, ClassError> {
    value
        .parse()
        .map_err(|_| ClassError::Database(eyre!("unexpected value '{}' in column {}", value, column)))
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DbSession {
    pub session_id: Uuid,
    pub batch_id: Uuid,
    pub subject: String,
    pub teacher_email: String,
    pub teacher_name: String,
    pub scheduled_date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: i32,
    pub teaching_minutes: i32,
    pub prep_buffer_minutes: i32,
    pub status: String,
    pub video_room_name: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbSession> for Session {
    type Error = ClassError;

    fn try_from(row: DbSession) -> Result<Self, Self::Error> {
        Ok(Session {
            status: parse_column::<SessionStatus>("class_sessions.status", &row.status)?,
            session_id: row.session_id,
            batch_id: row.batch_id,
            subject: row.subject,
            teacher_email: row.teacher_email,
            teacher_name: row.teacher_name,
            scheduled_date: row.scheduled_date,
            start_time: row.start_time,
            duration_minutes: row.duration_minutes,
            teaching_minutes: row.teaching_minutes,
            prep_buffer_minutes: row.prep_buffer_minutes,
            video_room_name: row.video_room_name,
            started_at: row.started_at,
            ended_at: row.ended_at,
            cancelled_at: row.cancelled_at,
            cancel_reason: row.cancel_reason,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DbRoom {
    pub room_id: String,
    pub room_name: String,
    pub subject: String,
    pub teacher_email: String,
    pub status: String,
    pub scheduled_start: DateTime<Utc>,
    pub duration_minutes: i32,
    pub open_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub max_participants: i32,
    pub batch_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbRoom> for Room {
    type Error = ClassError;

    fn try_from(row: DbRoom) -> Result<Self, Self::Error> {
        Ok(Room {
            status: parse_column::<SessionStatus>("rooms.status", &row.status)?,
            room_id: row.room_id,
            room_name: row.room_name,
            subject: row.subject,
            teacher_email: row.teacher_email,
            scheduled_start: row.scheduled_start,
            duration_minutes: row.duration_minutes,
            open_at: row.open_at,
            expires_at: row.expires_at,
            max_participants: row.max_participants,
            batch_id: row.batch_id,
            session_id: row.session_id,
            created_by: row.created_by,
            created_at: row.created_at,
            started_at: row.started_at,
            ended_at: row.ended_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DbAssignment {
    pub id: Uuid,
    pub room_id: String,
    pub participant_email: String,
    pub participant_name: String,
    pub participant_type: String,
    pub payment_status: String,
    pub join_token: Option<String>,
    pub token_redeemed_at: Option<DateTime<Utc>>,
    pub joined_at: Option<DateTime<Utc>>,
    pub left_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbAssignment> for Assignment {
    type Error = ClassError;

    fn try_from(row: DbAssignment) -> Result<Self, Self::Error> {
        Ok(Assignment {
            participant_type: parse_column::<Role>("room_assignments.participant_type", &row.participant_type)?,
            payment_status: parse_column::<PaymentStatus>("room_assignments.payment_status", &row.payment_status)?,
            id: row.id,
            room_id: row.room_id,
            participant_email: row.participant_email,
            participant_name: row.participant_name,
            join_token: row.join_token,
            token_redeemed_at: row.token_redeemed_at,
            joined_at: row.joined_at,
            left_at: row.left_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DbRoomEvent {
    pub id: Uuid,
    pub room_id: String,
    pub session_id: Option<Uuid>,
    pub event_type: String,
    pub actor: String,
    pub actor_role: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<DbRoomEvent> for RoomEvent {
    fn from(row: DbRoomEvent) -> Self {
        RoomEvent {
            id: row.id,
            room_id: row.room_id,
            session_id: row.session_id,
            event_type: row.event_type,
            actor: row.actor,
            actor_role: row.actor_role,
            payload: row.payload,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DbBatchMember {
    pub batch_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
    pub payment_status: String,
    /// Set for parents only.
    pub linked_student_email: Option<String>,
}

impl TryFrom<DbBatchMember> for BatchMember {
    type Error = ClassError;

    fn try_from(row: DbBatchMember) -> Result<Self, Self::Error> {
        Ok(BatchMember {
            role: parse_column::<Role>("batch_members.role", &row.role)?,
            payment_status: parse_column::<PaymentStatus>("batch_members.payment_status", &row.payment_status)?,
            email: row.email,
            name: row.name,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DbLedgerRow {
    pub id: Uuid,
    pub recipient: String,
    pub template_type: String,
    pub dedup_key: String,
    pub day: NaiveDate,
    pub status: String,
    pub claimed_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub external_message_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerStatus {
    Pending,
    Sent,
    Failed,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Pending => "pending",
            LedgerStatus::Sent => "sent",
            LedgerStatus::Failed => "failed",
        }
    }
}

impl FromStr for LedgerStatus {
    type Err = ClassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LedgerStatus::Pending),
            "sent" => Ok(LedgerStatus::Sent),
            "failed" => Ok(LedgerStatus::Failed),
            other => Err(ClassError::Validation(format!("unknown ledger status '{}'", other))),
        }
    }
}

impl DbLedgerRow {
    pub fn ledger_status(&self) -> Result<LedgerStatus, ClassError> {
        parse_column("notification_ledger.status", &self.status)
    }
}
