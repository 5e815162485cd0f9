use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use eyre::Result;
use liveclass_core::models::{Session, SessionFilter, SessionStatus};
use sqlx::PgExecutor;
use uuid::Uuid;

use super::status_labels;
use crate::models::DbSession;

const SESSION_COLUMNS: &str = r#"
    session_id, batch_id, subject, teacher_email, teacher_name, scheduled_date, start_time,
    duration_minutes, teaching_minutes, prep_buffer_minutes, status, video_room_name,
    started_at, ended_at, cancelled_at, cancel_reason, created_by, created_at
"#;

pub async fn insert_session<'e, E: PgExecutor<'e>>(executor: E, session: &Session) -> Result<()> {
    tracing::debug!(
        "Inserting session: id={}, batch={}, room={}",
        session.session_id, session.batch_id, session.video_room_name
    );

    sqlx::query(
        r#"
        INSERT INTO class_sessions (
            session_id, batch_id, subject, teacher_email, teacher_name, scheduled_date, start_time,
            duration_minutes, teaching_minutes, prep_buffer_minutes, status, video_room_name,
            created_by, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(session.session_id)
    .bind(session.batch_id)
    .bind(&session.subject)
    .bind(&session.teacher_email)
    .bind(&session.teacher_name)
    .bind(session.scheduled_date)
    .bind(session.start_time)
    .bind(session.duration_minutes)
    .bind(session.teaching_minutes)
    .bind(session.prep_buffer_minutes)
    .bind(session.status.as_str())
    .bind(&session.video_room_name)
    .bind(&session.created_by)
    .bind(session.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn get_session<'e, E: PgExecutor<'e>>(executor: E, session_id: Uuid) -> Result<Option<DbSession>> {
    let session = sqlx::query_as::<_, DbSession>(&format!(
        "SELECT {} FROM class_sessions WHERE session_id = $1",
        SESSION_COLUMNS
    ))
    .bind(session_id)
    .fetch_optional(executor)
    .await?;

    Ok(session)
}

pub async fn list_sessions<'e, E: PgExecutor<'e>>(executor: E, filter: &SessionFilter) -> Result<Vec<DbSession>> {
    let sessions = sqlx::query_as::<_, DbSession>(&format!(
        r#"
        SELECT {} FROM class_sessions
        WHERE ($1::date IS NULL OR scheduled_date >= $1)
          AND ($2::date IS NULL OR scheduled_date <= $2)
          AND (cardinality($3::text[]) = 0 OR status = ANY($3))
          AND ($4::uuid IS NULL OR batch_id = $4)
          AND ($5::text IS NULL OR teacher_email = $5)
        ORDER BY scheduled_date, start_time
        "#,
        SESSION_COLUMNS
    ))
    .bind(filter.from)
    .bind(filter.to)
    .bind(status_labels(&filter.statuses))
    .bind(filter.batch_id)
    .bind(filter.teacher_email.as_deref())
    .fetch_all(executor)
    .await?;

    Ok(sessions)
}

pub async fn scheduled_on<'e, E: PgExecutor<'e>>(executor: E, dates: &[NaiveDate]) -> Result<Vec<DbSession>> {
    let sessions = sqlx::query_as::<_, DbSession>(&format!(
        r#"
        SELECT {} FROM class_sessions
        WHERE status = 'scheduled' AND scheduled_date = ANY($1)
        ORDER BY scheduled_date, start_time
        "#,
        SESSION_COLUMNS
    ))
    .bind(dates.to_vec())
    .fetch_all(executor)
    .await?;

    Ok(sessions)
}

/// Sessions whose civil start (`scheduled_date + start_time`) lies in `[from, to)`.
pub async fn starting_between<'e, E: PgExecutor<'e>>(
    executor: E,
    from: NaiveDateTime,
    to: NaiveDateTime,
    statuses: &[SessionStatus],
) -> Result<Vec<DbSession>> {
    let sessions = sqlx::query_as::<_, DbSession>(&format!(
        r#"
        SELECT {} FROM class_sessions
        WHERE (scheduled_date + start_time) >= $1
          AND (scheduled_date + start_time) < $2
          AND status = ANY($3)
        ORDER BY scheduled_date, start_time
        "#,
        SESSION_COLUMNS
    ))
    .bind(from)
    .bind(to)
    .bind(status_labels(statuses))
    .fetch_all(executor)
    .await?;

    Ok(sessions)
}

pub async fn get_status<'e, E: PgExecutor<'e>>(executor: E, session_id: Uuid) -> Result<Option<String>> {
    let status = sqlx::query_scalar::<_, String>("SELECT status FROM class_sessions WHERE session_id = $1")
        .bind(session_id)
        .fetch_optional(executor)
        .await?;

    Ok(status)
}

/// Moves the session to `to` and stamps the matching timestamp column.
/// With a non-empty `from` the update only applies while the current status
/// is one of them. Returns whether a row changed.
pub async fn update_status<'e, E: PgExecutor<'e>>(
    executor: E,
    session_id: Uuid,
    from: &[SessionStatus],
    to: SessionStatus,
    at: DateTime<Utc>,
    cancel_reason: Option<&str>,
) -> Result<bool> {
    tracing::debug!("Updating session status: id={}, to={}", session_id, to);

    let result = sqlx::query(
        r#"
        UPDATE class_sessions SET
            status = $2,
            started_at = CASE WHEN $2 = 'live' THEN $3 ELSE started_at END,
            ended_at = CASE WHEN $2 = 'ended' THEN $3 ELSE ended_at END,
            cancelled_at = CASE WHEN $2 = 'cancelled' THEN $3 ELSE cancelled_at END,
            cancel_reason = CASE WHEN $2 = 'cancelled' THEN $4 ELSE cancel_reason END
        WHERE session_id = $1
          AND (cardinality($5::text[]) = 0 OR status = ANY($5))
        "#,
    )
    .bind(session_id)
    .bind(to.as_str())
    .bind(at)
    .bind(cancel_reason)
    .bind(status_labels(from))
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Applies a new civil schedule while the session is still `scheduled`.
pub async fn update_schedule<'e, E: PgExecutor<'e>>(
    executor: E,
    session_id: Uuid,
    scheduled_date: NaiveDate,
    start_time: NaiveTime,
    duration_minutes: i32,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE class_sessions SET
            scheduled_date = $2,
            start_time = $3,
            duration_minutes = $4,
            teaching_minutes = LEAST(teaching_minutes, $4)
        WHERE session_id = $1 AND status = 'scheduled'
        "#,
    )
    .bind(session_id)
    .bind(scheduled_date)
    .bind(start_time)
    .bind(duration_minutes)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}
