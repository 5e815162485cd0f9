use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ClassError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    Live,
    Ended,
    Cancelled,
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 4] = [
        SessionStatus::Scheduled,
        SessionStatus::Live,
        SessionStatus::Ended,
        SessionStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::Live => "live",
            SessionStatus::Ended => "ended",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Ended | SessionStatus::Cancelled)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = ClassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SessionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ClassError::Validation(format!("unknown status '{}'", s)))
    }
}

/// A scheduled class of one batch. Date and start time are civil values in
/// the portal timezone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
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
    pub status: SessionStatus,
    pub video_room_name: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn local_start(&self) -> NaiveDateTime {
        self.scheduled_date.and_time(self.start_time)
    }

    /// Civil instant from which the auto-start scanner may pick the session up.
    pub fn prep_opens_at(&self) -> NaiveDateTime {
        self.local_start() - Duration::minutes(i64::from(self.prep_buffer_minutes))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub batch_id: Uuid,
    pub subject: String,
    pub teacher_email: String,
    pub teacher_name: String,
    pub scheduled_date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: i32,
    /// Defaults to the full duration.
    pub teaching_minutes: Option<i32>,
    /// Defaults to the early-join window.
    pub prep_buffer_minutes: Option<i32>,
    pub max_participants: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub statuses: Vec<SessionStatus>,
    pub batch_id: Option<Uuid>,
    pub teacher_email: Option<String>,
}

impl SessionFilter {
    pub fn matches(&self, session: &Session) -> bool {
        self.from.is_none_or(|from| session.scheduled_date >= from)
            && self.to.is_none_or(|to| session.scheduled_date <= to)
            && (self.statuses.is_empty() || self.statuses.contains(&session.status))
            && self.batch_id.is_none_or(|batch| session.batch_id == batch)
            && self
                .teacher_email
                .as_deref()
                .is_none_or(|email| session.teacher_email == email)
    }
}
