use eyre::Result;
use liveclass_core::models::NewRoomEvent;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::DbRoomEvent;

pub async fn insert_event<'e, E: PgExecutor<'e>>(
    executor: E,
    room_id: &str,
    session_id: Option<Uuid>,
    event: &NewRoomEvent,
) -> Result<Uuid> {
    let id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO room_events (id, room_id, session_id, event_type, actor, actor_role, payload, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(id)
    .bind(room_id)
    .bind(session_id)
    .bind(&event.event_type)
    .bind(&event.actor)
    .bind(&event.actor_role)
    .bind(&event.payload)
    .bind(event.created_at)
    .execute(executor)
    .await?;

    Ok(id)
}

pub async fn events_for_room<'e, E: PgExecutor<'e>>(executor: E, room_id: &str) -> Result<Vec<DbRoomEvent>> {
    let events = sqlx::query_as::<_, DbRoomEvent>(
        r#"
        SELECT id, room_id, session_id, event_type, actor, actor_role, payload, created_at
        FROM room_events
        WHERE room_id = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(room_id)
    .fetch_all(executor)
    .await?;

    Ok(events)
}

pub async fn events_for_session<'e, E: PgExecutor<'e>>(executor: E, session_id: Uuid) -> Result<Vec<DbRoomEvent>> {
    let events = sqlx::query_as::<_, DbRoomEvent>(
        r#"
        SELECT id, room_id, session_id, event_type, actor, actor_role, payload, created_at
        FROM room_events
        WHERE session_id = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(session_id)
    .fetch_all(executor)
    .await?;

    Ok(events)
}
