use chrono::{DateTime, Utc};
use eyre::Result;
use liveclass_core::models::{Room, SessionStatus};
use sqlx::PgExecutor;

use super::status_labels;
use crate::models::DbRoom;

const ROOM_COLUMNS: &str = r#"
    room_id, room_name, subject, teacher_email, status, scheduled_start, duration_minutes,
    open_at, expires_at, max_participants, batch_id, session_id, created_by, created_at,
    started_at, ended_at
"#;

pub async fn insert_room<'e, E: PgExecutor<'e>>(executor: E, room: &Room) -> Result<()> {
    tracing::debug!("Inserting room: id={}, session={:?}", room.room_id, room.session_id);

    sqlx::query(
        r#"
        INSERT INTO rooms (
            room_id, room_name, subject, teacher_email, status, scheduled_start, duration_minutes,
            open_at, expires_at, max_participants, batch_id, session_id, created_by, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(&room.room_id)
    .bind(&room.room_name)
    .bind(&room.subject)
    .bind(&room.teacher_email)
    .bind(room.status.as_str())
    .bind(room.scheduled_start)
    .bind(room.duration_minutes)
    .bind(room.open_at)
    .bind(room.expires_at)
    .bind(room.max_participants)
    .bind(room.batch_id)
    .bind(room.session_id)
    .bind(&room.created_by)
    .bind(room.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn get_room<'e, E: PgExecutor<'e>>(executor: E, room_id: &str) -> Result<Option<DbRoom>> {
    let room = sqlx::query_as::<_, DbRoom>(&format!("SELECT {} FROM rooms WHERE room_id = $1", ROOM_COLUMNS))
        .bind(room_id)
        .fetch_optional(executor)
        .await?;

    Ok(room)
}

pub async fn room_exists<'e, E: PgExecutor<'e>>(executor: E, room_id: &str) -> Result<bool> {
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM rooms WHERE room_id = $1)")
        .bind(room_id)
        .fetch_one(executor)
        .await?;

    Ok(exists)
}

/// Rooms in any of `statuses`, or every room when the list is empty.
pub async fn list_rooms<'e, E: PgExecutor<'e>>(executor: E, statuses: &[SessionStatus]) -> Result<Vec<DbRoom>> {
    let rooms = sqlx::query_as::<_, DbRoom>(&format!(
        r#"
        SELECT {} FROM rooms
        WHERE cardinality($1::text[]) = 0 OR status = ANY($1)
        ORDER BY scheduled_start
        "#,
        ROOM_COLUMNS
    ))
    .bind(status_labels(statuses))
    .fetch_all(executor)
    .await?;

    Ok(rooms)
}

pub async fn get_status<'e, E: PgExecutor<'e>>(executor: E, room_id: &str) -> Result<Option<String>> {
    let status = sqlx::query_scalar::<_, String>("SELECT status FROM rooms WHERE room_id = $1")
        .bind(room_id)
        .fetch_optional(executor)
        .await?;

    Ok(status)
}

/// Same contract as the session variant: an empty `from` updates
/// unconditionally, otherwise only from one of the listed statuses.
pub async fn update_status<'e, E: PgExecutor<'e>>(
    executor: E,
    room_id: &str,
    from: &[SessionStatus],
    to: SessionStatus,
    at: DateTime<Utc>,
) -> Result<bool> {
    tracing::debug!("Updating room status: id={}, to={}", room_id, to);

    let result = sqlx::query(
        r#"
        UPDATE rooms SET
            status = $2,
            started_at = CASE WHEN $2 = 'live' THEN $3 ELSE started_at END,
            ended_at = CASE WHEN $2 IN ('ended', 'cancelled') THEN $3 ELSE ended_at END
        WHERE room_id = $1
          AND (cardinality($4::text[]) = 0 OR status = ANY($4))
        "#,
    )
    .bind(room_id)
    .bind(to.as_str())
    .bind(at)
    .bind(status_labels(from))
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Moves the join window of a room that is still `scheduled`.
pub async fn update_schedule<'e, E: PgExecutor<'e>>(
    executor: E,
    room_id: &str,
    scheduled_start: DateTime<Utc>,
    duration_minutes: i32,
    open_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE rooms SET
            scheduled_start = $2,
            duration_minutes = $3,
            open_at = $4,
            expires_at = $5
        WHERE room_id = $1 AND status = 'scheduled'
        "#,
    )
    .bind(room_id)
    .bind(scheduled_start)
    .bind(duration_minutes)
    .bind(open_at)
    .bind(expires_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}
