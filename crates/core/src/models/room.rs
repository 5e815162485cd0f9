use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SessionStatus;

/// Join-gating projection of a class. Rooms created for a session carry the
/// session's video room name as `room_id`; coordinators may also create
/// standalone rooms with no backing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub room_id: String,
    pub room_name: String,
    pub subject: String,
    pub teacher_email: String,
    pub status: SessionStatus,
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

impl Room {
    pub fn class_ends_at(&self) -> DateTime<Utc> {
        self.scheduled_start + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// A live room whose class time has elapsed and should be ended.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Live && now > self.class_ends_at()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRoom {
    pub room_name: String,
    pub subject: String,
    pub teacher_email: String,
    pub teacher_name: String,
    pub scheduled_start: DateTime<Utc>,
    pub duration_minutes: i32,
    pub max_participants: Option<i32>,
    pub batch_id: Option<Uuid>,
}
