use chrono::{DateTime, Utc};
use eyre::Result;
use sqlx::PgExecutor;

pub async fn join_count<'e, E: PgExecutor<'e>>(executor: E, room_id: &str, email: &str) -> Result<i32> {
    let count = sqlx::query_scalar::<_, i32>(
        "SELECT join_count FROM attendance WHERE room_id = $1 AND participant_email = lower($2)",
    )
    .bind(room_id)
    .bind(email)
    .fetch_optional(executor)
    .await?;

    Ok(count.unwrap_or(0))
}

pub async fn record_join<'e, E: PgExecutor<'e>>(
    executor: E,
    room_id: &str,
    email: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO attendance (room_id, participant_email, join_count, first_joined_at, last_joined_at)
        VALUES ($1, lower($2), 1, $3, $3)
        ON CONFLICT (room_id, participant_email) DO UPDATE SET
            join_count = attendance.join_count + 1,
            last_joined_at = EXCLUDED.last_joined_at
        "#,
    )
    .bind(room_id)
    .bind(email)
    .bind(at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn record_leave<'e, E: PgExecutor<'e>>(
    executor: E,
    room_id: &str,
    email: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO attendance (room_id, participant_email, join_count, last_left_at)
        VALUES ($1, lower($2), 0, $3)
        ON CONFLICT (room_id, participant_email) DO UPDATE SET
            last_left_at = EXCLUDED.last_left_at
        "#,
    )
    .bind(room_id)
    .bind(email)
    .bind(at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Whether an unpaid per-session fee exists for the participant, or for a
/// student the participant is the linked parent of.
pub async fn has_unpaid_fee<'e, E: PgExecutor<'e>>(executor: E, room_id: &str, email: &str) -> Result<bool> {
    let unpaid = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM session_fees f
            WHERE f.room_id = $1
              AND f.paid = FALSE
              AND (
                  lower(f.student_email) = lower($2)
                  OR lower(f.student_email) IN (
                      SELECT lower(m.linked_student_email)
                      FROM batch_members m
                      WHERE lower(m.email) = lower($2)
                        AND m.role = 'parent'
                        AND m.linked_student_email IS NOT NULL
                  )
              )
        )
        "#,
    )
    .bind(room_id)
    .bind(email)
    .fetch_one(executor)
    .await?;

    Ok(unpaid)
}
