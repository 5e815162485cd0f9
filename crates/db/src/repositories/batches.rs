use eyre::Result;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::DbBatchMember;

/// Batch rosters are maintained by the portal; the engine only reads them.
pub async fn members<'e, E: PgExecutor<'e>>(executor: E, batch_id: Uuid) -> Result<Vec<DbBatchMember>> {
    let members = sqlx::query_as::<_, DbBatchMember>(
        r#"
        SELECT batch_id, email, name, role, payment_status, linked_student_email
        FROM batch_members
        WHERE batch_id = $1
        ORDER BY role, email
        "#,
    )
    .bind(batch_id)
    .fetch_all(executor)
    .await?;

    Ok(members)
}
