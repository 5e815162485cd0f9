//! Join-window arithmetic and civil-time helpers.
//!
//! Sessions are scheduled on the portal's local calendar (date + wall clock
//! time) while rooms gate joins on absolute instants. Everything that
//! crosses that boundary goes through this module.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::errors::{ClassError, ClassResult};
use crate::models::Session;

pub const DEFAULT_EARLY_JOIN_MINUTES: i64 = 15;
pub const DEFAULT_GRACE_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinWindows {
    pub open_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Computes the join-eligible interval of a class.
///
/// `open_at = start - early_join` and
/// `expires_at = start + duration + grace`, so for valid input
/// `open_at < start < expires_at` always holds.
pub fn windows(
    scheduled_start: DateTime<Utc>,
    duration_minutes: i32,
    early_join_minutes: i64,
    grace_minutes: i64,
) -> ClassResult<JoinWindows> {
    if duration_minutes <= 0 {
        return Err(ClassError::Validation(format!(
            "duration must be positive, got {} minutes",
            duration_minutes
        )));
    }
    if early_join_minutes <= 0 {
        return Err(ClassError::Validation(format!(
            "early join window must be positive, got {} minutes",
            early_join_minutes
        )));
    }
    if grace_minutes < 0 {
        return Err(ClassError::Validation(format!(
            "grace window cannot be negative, got {} minutes",
            grace_minutes
        )));
    }

    Ok(JoinWindows {
        open_at: scheduled_start - Duration::minutes(early_join_minutes),
        expires_at: scheduled_start
            + Duration::minutes(i64::from(duration_minutes))
            + Duration::minutes(grace_minutes),
    })
}

/// Wall clock reading in the portal timezone.
pub fn local_now(tz: Tz, now: DateTime<Utc>) -> NaiveDateTime {
    now.with_timezone(&tz).naive_local()
}

/// Resolves a civil date-time to an instant. Ambiguous times (clocks
/// falling back) take the earlier instant; times inside a gap are rejected.
pub fn resolve_local(tz: Tz, local: NaiveDateTime) -> ClassResult<DateTime<Utc>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(at) => Ok(at.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(ClassError::Validation(format!(
            "{} does not exist in timezone {}",
            local, tz
        ))),
    }
}

/// Instant the class time of a session ends. The civil start is resolved
/// first and the duration added to the instant, so a session spanning a
/// DST change lasts exactly its duration.
pub fn session_ends_at(tz: Tz, session: &Session) -> ClassResult<DateTime<Utc>> {
    let start = resolve_local(tz, session.local_start())?;
    Ok(start + Duration::minutes(i64::from(session.duration_minutes)))
}

/// Half-open band of civil start times a reminder window selects on one
/// poll: `[now + before - half_width, now + before + half_width)`.
pub fn reminder_band(
    now_local: NaiveDateTime,
    minutes_before: i64,
    half_width: std::time::Duration,
) -> (NaiveDateTime, NaiveDateTime) {
    let target = now_local + Duration::minutes(minutes_before);
    let half = Duration::milliseconds(half_width.as_millis() as i64);
    (target - half, target + half)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn gap_times_are_rejected() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let local = NaiveDate::from_ymd_opt(2026, 3, 8)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        assert!(matches!(resolve_local(tz, local), Err(ClassError::Validation(_))));
    }

    #[test]
    fn ambiguous_times_take_the_earlier_instant() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let local = NaiveDate::from_ymd_opt(2026, 11, 1)
            .unwrap()
            .and_hms_opt(1, 30, 0)
            .unwrap();
        let at = resolve_local(tz, local).unwrap();
        // EDT is UTC-4 before the fall-back.
        assert_eq!(at.naive_utc(), local + Duration::hours(4));
    }
}
