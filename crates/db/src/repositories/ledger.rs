use chrono::{DateTime, NaiveDate, Utc};
use eyre::Result;
use liveclass_core::models::LedgerClaim;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{DbLedgerRow, LedgerStatus};

/// True when rows exist for the key and day and none of them is a pending
/// claim made at or before `stale_before`.
pub async fn key_settled<'e, E: PgExecutor<'e>>(
    executor: E,
    template_type: &str,
    dedup_key: &str,
    day: NaiveDate,
    stale_before: DateTime<Utc>,
) -> Result<bool> {
    let settled = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM notification_ledger
            WHERE template_type = $1 AND dedup_key = $2 AND day = $3
        ) AND NOT EXISTS (
            SELECT 1 FROM notification_ledger
            WHERE template_type = $1 AND dedup_key = $2 AND day = $3
              AND status = 'pending' AND claimed_at <= $4
        )
        "#,
    )
    .bind(template_type)
    .bind(dedup_key)
    .bind(day)
    .bind(stale_before)
    .fetch_one(executor)
    .await?;

    Ok(settled)
}

/// Inserts a pending row, or takes over a pending row claimed at or before
/// `stale_before`. Any other existing row makes this return `None`.
pub async fn claim<'e, E: PgExecutor<'e>>(
    executor: E,
    claim: &LedgerClaim,
    now: DateTime<Utc>,
    stale_before: DateTime<Utc>,
) -> Result<Option<Uuid>> {
    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO notification_ledger (id, recipient, template_type, dedup_key, day, status, claimed_at)
        VALUES ($1, lower($2), $3, $4, $5, 'pending', $6)
        ON CONFLICT (recipient, template_type, dedup_key, day) DO UPDATE SET
            claimed_at = EXCLUDED.claimed_at
        WHERE notification_ledger.status = 'pending'
          AND notification_ledger.claimed_at <= $7
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&claim.recipient)
    .bind(&claim.template_type)
    .bind(&claim.dedup_key)
    .bind(claim.day)
    .bind(now)
    .bind(stale_before)
    .fetch_optional(executor)
    .await?;

    Ok(id)
}

/// Settles a claim. Returns `false` when the id is unknown.
pub async fn complete<'e, E: PgExecutor<'e>>(
    executor: E,
    claim_id: Uuid,
    status: LedgerStatus,
    external_message_id: Option<&str>,
    error: Option<&str>,
    at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE notification_ledger SET
            status = $2,
            external_message_id = $3,
            error = $4,
            completed_at = $5
        WHERE id = $1
        "#,
    )
    .bind(claim_id)
    .bind(status.as_str())
    .bind(external_message_id)
    .bind(error)
    .bind(at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Rows whose key starts with `prefix`.
pub async fn rows_with_prefix<'e, E: PgExecutor<'e>>(executor: E, prefix: &str) -> Result<Vec<DbLedgerRow>> {
    let rows = sqlx::query_as::<_, DbLedgerRow>(
        r#"
        SELECT id, recipient, template_type, dedup_key, day, status, claimed_at, completed_at,
               external_message_id, error
        FROM notification_ledger
        WHERE starts_with(dedup_key, $1)
        ORDER BY claimed_at
        "#,
    )
    .bind(prefix)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}
