use chrono::{DateTime, Utc};
use eyre::Result;
use liveclass_core::models::{Assignment, BatchMember};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::DbAssignment;

const ASSIGNMENT_COLUMNS: &str = r#"
    id, room_id, participant_email, participant_name, participant_type, payment_status,
    join_token, token_redeemed_at, joined_at, left_at, created_at
"#;

pub async fn insert_assignment<'e, E: PgExecutor<'e>>(executor: E, assignment: &Assignment) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO room_assignments (
            id, room_id, participant_email, participant_name, participant_type, payment_status,
            join_token, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(assignment.id)
    .bind(&assignment.room_id)
    .bind(&assignment.participant_email)
    .bind(&assignment.participant_name)
    .bind(assignment.participant_type.as_str())
    .bind(assignment.payment_status.as_str())
    .bind(assignment.join_token.as_deref())
    .bind(assignment.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn find_assignment<'e, E: PgExecutor<'e>>(
    executor: E,
    room_id: &str,
    email: &str,
) -> Result<Option<DbAssignment>> {
    let assignment = sqlx::query_as::<_, DbAssignment>(&format!(
        "SELECT {} FROM room_assignments WHERE room_id = $1 AND lower(participant_email) = lower($2)",
        ASSIGNMENT_COLUMNS
    ))
    .bind(room_id)
    .bind(email)
    .fetch_optional(executor)
    .await?;

    Ok(assignment)
}

pub async fn find_by_unredeemed_token<'e, E: PgExecutor<'e>>(
    executor: E,
    token: &str,
) -> Result<Option<DbAssignment>> {
    let assignment = sqlx::query_as::<_, DbAssignment>(&format!(
        "SELECT {} FROM room_assignments WHERE join_token = $1 AND token_redeemed_at IS NULL",
        ASSIGNMENT_COLUMNS
    ))
    .bind(token)
    .fetch_optional(executor)
    .await?;

    Ok(assignment)
}

/// Inserts the member's assignment or keeps the existing one. An existing
/// unredeemed token survives; a missing or spent one is replaced by
/// `fresh_token`.
pub async fn ensure_invite_token<'e, E: PgExecutor<'e>>(
    executor: E,
    room_id: &str,
    member: &BatchMember,
    fresh_token: &str,
    at: DateTime<Utc>,
) -> Result<DbAssignment> {
    let assignment = sqlx::query_as::<_, DbAssignment>(&format!(
        r#"
        INSERT INTO room_assignments (
            id, room_id, participant_email, participant_name, participant_type, payment_status,
            join_token, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (room_id, participant_email) DO UPDATE SET
            join_token = CASE
                WHEN room_assignments.join_token IS NULL OR room_assignments.token_redeemed_at IS NOT NULL
                THEN EXCLUDED.join_token
                ELSE room_assignments.join_token
            END,
            token_redeemed_at = CASE
                WHEN room_assignments.join_token IS NULL OR room_assignments.token_redeemed_at IS NOT NULL
                THEN NULL
                ELSE room_assignments.token_redeemed_at
            END
        RETURNING {}
        "#,
        ASSIGNMENT_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(room_id)
    .bind(&member.email)
    .bind(&member.name)
    .bind(member.role.as_str())
    .bind(member.payment_status.as_str())
    .bind(fresh_token)
    .bind(at)
    .fetch_one(executor)
    .await?;

    Ok(assignment)
}

/// Single-use redemption. Returns `false` when the token is unknown or spent.
pub async fn redeem_token<'e, E: PgExecutor<'e>>(executor: E, token: &str, at: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE room_assignments SET token_redeemed_at = $2
        WHERE join_token = $1 AND token_redeemed_at IS NULL
        "#,
    )
    .bind(token)
    .bind(at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn stamp_joined<'e, E: PgExecutor<'e>>(
    executor: E,
    room_id: &str,
    email: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE room_assignments SET joined_at = $3 WHERE room_id = $1 AND lower(participant_email) = lower($2)",
    )
    .bind(room_id)
    .bind(email)
    .bind(at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn stamp_left<'e, E: PgExecutor<'e>>(
    executor: E,
    room_id: &str,
    email: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE room_assignments SET left_at = $3 WHERE room_id = $1 AND lower(participant_email) = lower($2)",
    )
    .bind(room_id)
    .bind(email)
    .bind(at)
    .execute(executor)
    .await?;

    Ok(())
}
