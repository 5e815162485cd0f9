//! PostgreSQL implementations of the engine's storage ports.
//!
//! Multi-table writes run in one transaction. Status changes are
//! compare-and-set `UPDATE ... WHERE status = ANY(..)` statements, so two
//! callers racing on the same record cannot both apply.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use eyre::WrapErr;
use liveclass_core::errors::{ClassError, ClassResult};
use liveclass_core::models::{
    Assignment, BatchMember, DeliveryOutcome, LedgerClaim, LifecycleTarget, NewRoomEvent, ReminderCounts, Room,
    RoomEvent, Session, SessionFilter, SessionStatus,
};
use liveclass_core::ports::{AttendanceKind, NotificationLedger, ScheduleChange, SessionStore, StatusChange};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::DbPool;
use crate::models::LedgerStatus;
use crate::repositories::{assignments, attendance, batches, events, ledger, rooms, sessions};

fn convert_all<Row, T>(rows: Vec<Row>) -> ClassResult<Vec<T>>
where
    T: TryFrom<Row, Error = ClassError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn stale_before(now: DateTime<Utc>, stale_after: Duration) -> ClassResult<DateTime<Utc>> {
    let age = chrono::Duration::from_std(stale_after)
        .map_err(|e| ClassError::Internal(format!("invalid stale claim age: {}", e)))?;
    Ok(now - age)
}

#[derive(Clone)]
pub struct PgSessionStore {
    pool: DbPool,
}

impl PgSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> ClassResult<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await.wrap_err("failed to open transaction")?)
    }

    async fn ensure_room_free(&self, tx: &mut Transaction<'static, Postgres>, room_id: &str) -> ClassResult<()> {
        if rooms::room_exists(&mut **tx, room_id).await? {
            return Err(ClassError::Validation(format!("room {} already exists", room_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create_session(
        &self,
        session: &Session,
        room: &Room,
        teacher: &Assignment,
        event: &NewRoomEvent,
    ) -> ClassResult<()> {
        let mut tx = self.begin().await?;
        self.ensure_room_free(&mut tx, &room.room_id).await?;

        sessions::insert_session(&mut *tx, session).await?;
        rooms::insert_room(&mut *tx, room).await?;
        assignments::insert_assignment(&mut *tx, teacher).await?;
        events::insert_event(&mut *tx, &room.room_id, Some(session.session_id), event).await?;

        tx.commit().await.wrap_err("failed to commit session creation")?;
        tracing::info!("Created session {} with room {}", session.session_id, room.room_id);
        Ok(())
    }

    async fn create_room(&self, room: &Room, teacher: &Assignment, event: &NewRoomEvent) -> ClassResult<()> {
        let mut tx = self.begin().await?;
        self.ensure_room_free(&mut tx, &room.room_id).await?;

        rooms::insert_room(&mut *tx, room).await?;
        assignments::insert_assignment(&mut *tx, teacher).await?;
        events::insert_event(&mut *tx, &room.room_id, None, event).await?;

        tx.commit().await.wrap_err("failed to commit room creation")?;
        tracing::info!("Created standalone room {}", room.room_id);
        Ok(())
    }

    async fn get_session(&self, session_id: Uuid) -> ClassResult<Option<Session>> {
        sessions::get_session(&self.pool, session_id)
            .await?
            .map(Session::try_from)
            .transpose()
    }

    async fn get_room(&self, room_id: &str) -> ClassResult<Option<Room>> {
        rooms::get_room(&self.pool, room_id).await?.map(Room::try_from).transpose()
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> ClassResult<Vec<Session>> {
        convert_all(sessions::list_sessions(&self.pool, filter).await?)
    }

    async fn list_rooms(&self, statuses: &[SessionStatus]) -> ClassResult<Vec<Room>> {
        convert_all(rooms::list_rooms(&self.pool, statuses).await?)
    }

    async fn scheduled_sessions_on(&self, dates: &[NaiveDate]) -> ClassResult<Vec<Session>> {
        convert_all(sessions::scheduled_on(&self.pool, dates).await?)
    }

    async fn sessions_starting_between(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
        statuses: &[SessionStatus],
    ) -> ClassResult<Vec<Session>> {
        convert_all(sessions::starting_between(&self.pool, from, to, statuses).await?)
    }

    async fn current_status(&self, target: &LifecycleTarget) -> ClassResult<Option<SessionStatus>> {
        let status = match target {
            LifecycleTarget::Session(id) => sessions::get_status(&self.pool, *id).await?,
            LifecycleTarget::Room(id) => rooms::get_status(&self.pool, id).await?,
        };
        status.map(|s| s.parse::<SessionStatus>()).transpose()
    }

    async fn apply_status_change(&self, change: &StatusChange) -> ClassResult<bool> {
        let mut tx = self.begin().await?;

        let (room_id, session_id) = match &change.target {
            LifecycleTarget::Session(id) => {
                let applied = sessions::update_status(
                    &mut *tx,
                    *id,
                    &change.from,
                    change.to,
                    change.at,
                    change.cancel_reason.as_deref(),
                )
                .await?;
                if !applied {
                    return Ok(false);
                }
                let Some(session) = sessions::get_session(&mut *tx, *id).await? else {
                    return Ok(false);
                };
                rooms::update_status(&mut *tx, &session.video_room_name, &[], change.to, change.at).await?;
                (session.video_room_name, Some(*id))
            }
            LifecycleTarget::Room(id) => {
                let applied = rooms::update_status(&mut *tx, id, &change.from, change.to, change.at).await?;
                if !applied {
                    return Ok(false);
                }
                let Some(room) = rooms::get_room(&mut *tx, id).await? else {
                    return Ok(false);
                };
                if let Some(linked) = room.session_id {
                    sessions::update_status(
                        &mut *tx,
                        linked,
                        &[],
                        change.to,
                        change.at,
                        change.cancel_reason.as_deref(),
                    )
                    .await?;
                }
                (room.room_id, room.session_id)
            }
        };

        events::insert_event(&mut *tx, &room_id, session_id, &change.event).await?;
        tx.commit().await.wrap_err("failed to commit status change")?;
        Ok(true)
    }

    async fn update_schedule(&self, change: &ScheduleChange) -> ClassResult<bool> {
        let mut tx = self.begin().await?;

        let (room_id, session_id) = match &change.target {
            LifecycleTarget::Session(id) => {
                let applied = sessions::update_schedule(
                    &mut *tx,
                    *id,
                    change.scheduled_date,
                    change.start_time,
                    change.duration_minutes,
                )
                .await?;
                if !applied {
                    return Ok(false);
                }
                let Some(session) = sessions::get_session(&mut *tx, *id).await? else {
                    return Ok(false);
                };
                (session.video_room_name, Some(*id))
            }
            LifecycleTarget::Room(id) => {
                let Some(room) = rooms::get_room(&mut *tx, id).await? else {
                    return Ok(false);
                };
                (room.room_id, room.session_id)
            }
        };

        let room_applied = rooms::update_schedule(
            &mut *tx,
            &room_id,
            change.scheduled_start,
            change.duration_minutes,
            change.open_at,
            change.expires_at,
        )
        .await?;
        if matches!(change.target, LifecycleTarget::Room(_)) {
            if !room_applied {
                return Ok(false);
            }
            if let Some(linked) = session_id {
                sessions::update_schedule(
                    &mut *tx,
                    linked,
                    change.scheduled_date,
                    change.start_time,
                    change.duration_minutes,
                )
                .await?;
            }
        }

        events::insert_event(&mut *tx, &room_id, session_id, &change.event).await?;
        tx.commit().await.wrap_err("failed to commit reschedule")?;
        Ok(true)
    }

    async fn events(&self, target: &LifecycleTarget) -> ClassResult<Vec<RoomEvent>> {
        let rows = match target {
            LifecycleTarget::Session(id) => events::events_for_session(&self.pool, *id).await?,
            LifecycleTarget::Room(id) => events::events_for_room(&self.pool, id).await?,
        };
        Ok(rows.into_iter().map(RoomEvent::from).collect())
    }

    async fn batch_members(&self, batch_id: Uuid) -> ClassResult<Vec<BatchMember>> {
        convert_all(batches::members(&self.pool, batch_id).await?)
    }

    async fn find_assignment(&self, room_id: &str, email: &str) -> ClassResult<Option<Assignment>> {
        assignments::find_assignment(&self.pool, room_id, email)
            .await?
            .map(Assignment::try_from)
            .transpose()
    }

    async fn find_assignment_by_token(&self, token: &str) -> ClassResult<Option<Assignment>> {
        assignments::find_by_unredeemed_token(&self.pool, token)
            .await?
            .map(Assignment::try_from)
            .transpose()
    }

    async fn ensure_invite_token(
        &self,
        room_id: &str,
        member: &BatchMember,
        fresh_token: &str,
        at: DateTime<Utc>,
    ) -> ClassResult<Assignment> {
        let row = assignments::ensure_invite_token(&self.pool, room_id, member, fresh_token, at).await?;
        Assignment::try_from(row)
    }

    async fn redeem_invite_token(&self, token: &str, at: DateTime<Utc>) -> ClassResult<bool> {
        Ok(assignments::redeem_token(&self.pool, token, at).await?)
    }

    async fn has_unpaid_session_fee(&self, room_id: &str, email: &str) -> ClassResult<bool> {
        Ok(attendance::has_unpaid_fee(&self.pool, room_id, email).await?)
    }

    async fn attendance_join_count(&self, room_id: &str, email: &str) -> ClassResult<i32> {
        Ok(attendance::join_count(&self.pool, room_id, email).await?)
    }

    async fn record_attendance(
        &self,
        room_id: &str,
        email: &str,
        kind: AttendanceKind,
        at: DateTime<Utc>,
    ) -> ClassResult<()> {
        let mut tx = self.begin().await?;
        match kind {
            AttendanceKind::Joined => {
                attendance::record_join(&mut *tx, room_id, email, at).await?;
                assignments::stamp_joined(&mut *tx, room_id, email, at).await?;
            }
            AttendanceKind::Left => {
                attendance::record_leave(&mut *tx, room_id, email, at).await?;
                assignments::stamp_left(&mut *tx, room_id, email, at).await?;
            }
        }
        tx.commit().await.wrap_err("failed to commit attendance")?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgNotificationLedger {
    pool: DbPool,
}

impl PgNotificationLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationLedger for PgNotificationLedger {
    async fn key_used_on(
        &self,
        template_type: &str,
        dedup_key: &str,
        day: NaiveDate,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> ClassResult<bool> {
        let cutoff = stale_before(now, stale_after)?;
        Ok(ledger::key_settled(&self.pool, template_type, dedup_key, day, cutoff).await?)
    }

    async fn try_claim(
        &self,
        claim: &LedgerClaim,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> ClassResult<Option<Uuid>> {
        let cutoff = stale_before(now, stale_after)?;
        Ok(ledger::claim(&self.pool, claim, now, cutoff).await?)
    }

    async fn complete(&self, claim_id: Uuid, outcome: &DeliveryOutcome, at: DateTime<Utc>) -> ClassResult<()> {
        let found = match outcome {
            DeliveryOutcome::Sent { external_message_id } => {
                ledger::complete(
                    &self.pool,
                    claim_id,
                    LedgerStatus::Sent,
                    external_message_id.as_deref(),
                    None,
                    at,
                )
                .await?
            }
            DeliveryOutcome::Failed { error } => {
                ledger::complete(&self.pool, claim_id, LedgerStatus::Failed, None, Some(error.as_str()), at).await?
            }
        };
        if !found {
            return Err(ClassError::NotFound(format!("ledger claim {}", claim_id)));
        }
        Ok(())
    }

    async fn status_counts(&self, dedup_prefix: &str) -> ClassResult<ReminderCounts> {
        let rows = ledger::rows_with_prefix(&self.pool, dedup_prefix).await?;
        let mut counts = ReminderCounts::default();
        for row in &rows {
            match row.ledger_status()? {
                LedgerStatus::Sent => counts.sent += 1,
                LedgerStatus::Failed => counts.failed += 1,
                LedgerStatus::Pending => counts.pending += 1,
            }
        }
        Ok(counts)
    }
}
