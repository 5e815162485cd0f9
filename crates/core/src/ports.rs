//! Seams between the engine and the outside world.
//!
//! The db crate implements the storage traits against PostgreSQL, the api
//! crate implements the provider and dispatch traits over HTTP, and
//! [`crate::mock`] implements all of them in memory.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ClassResult;
use crate::models::{
    Assignment, BatchMember, DeliveryOutcome, DispatchReceipt, JoinGrants, LedgerClaim, LifecycleTarget,
    LiveParticipant, MintedCredential, NewRoomEvent, Notification, ReminderCounts, Room, RoomEvent, Session,
    SessionFilter, SessionStatus,
};

/// Conditional status update plus its audit event, applied atomically.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub target: LifecycleTarget,
    /// Statuses the record must currently be in for the change to apply.
    pub from: Vec<SessionStatus>,
    pub to: SessionStatus,
    pub at: DateTime<Utc>,
    pub cancel_reason: Option<String>,
    pub event: NewRoomEvent,
}

/// New schedule for a record that is still `scheduled`. Carries both the
/// civil and the absolute form so the session and its room stay in step.
#[derive(Debug, Clone)]
pub struct ScheduleChange {
    pub target: LifecycleTarget,
    pub scheduled_date: NaiveDate,
    pub start_time: NaiveTime,
    pub scheduled_start: DateTime<Utc>,
    pub duration_minutes: i32,
    pub open_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub event: NewRoomEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceKind {
    Joined,
    Left,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Writes a session, its room projection, the teacher assignment and the
    /// creation event in one transaction.
    async fn create_session(
        &self,
        session: &Session,
        room: &Room,
        teacher: &Assignment,
        event: &NewRoomEvent,
    ) -> ClassResult<()>;

    /// Writes a standalone room and its teacher assignment in one transaction.
    async fn create_room(&self, room: &Room, teacher: &Assignment, event: &NewRoomEvent) -> ClassResult<()>;

    async fn get_session(&self, session_id: Uuid) -> ClassResult<Option<Session>>;

    async fn get_room(&self, room_id: &str) -> ClassResult<Option<Room>>;

    async fn list_sessions(&self, filter: &SessionFilter) -> ClassResult<Vec<Session>>;

    /// Rooms in any of the given statuses; all rooms when empty.
    async fn list_rooms(&self, statuses: &[SessionStatus]) -> ClassResult<Vec<Room>>;

    /// Sessions still `scheduled` on any of the given civil dates.
    async fn scheduled_sessions_on(&self, dates: &[NaiveDate]) -> ClassResult<Vec<Session>>;

    /// Sessions whose civil start lies in `[from, to)` and whose status is one
    /// of `statuses`.
    async fn sessions_starting_between(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
        statuses: &[SessionStatus],
    ) -> ClassResult<Vec<Session>>;

    async fn current_status(&self, target: &LifecycleTarget) -> ClassResult<Option<SessionStatus>>;

    /// Compare-and-set on the status column. Returns `false` without writing
    /// anything when the current status is not in `change.from`. The linked
    /// session or room is updated in the same transaction.
    async fn apply_status_change(&self, change: &StatusChange) -> ClassResult<bool>;

    /// Applies a new schedule only while the record is `scheduled`.
    async fn update_schedule(&self, change: &ScheduleChange) -> ClassResult<bool>;

    async fn events(&self, target: &LifecycleTarget) -> ClassResult<Vec<RoomEvent>>;

    /// Teacher-independent members of a batch: coordinator, academic
    /// operator, students and their parents.
    async fn batch_members(&self, batch_id: Uuid) -> ClassResult<Vec<BatchMember>>;

    async fn find_assignment(&self, room_id: &str, email: &str) -> ClassResult<Option<Assignment>>;

    /// Assignment holding this invite token, if the token is still unredeemed.
    async fn find_assignment_by_token(&self, token: &str) -> ClassResult<Option<Assignment>>;

    /// Upserts the member's assignment. An existing unredeemed token is kept,
    /// otherwise `fresh_token` becomes the active invite token.
    async fn ensure_invite_token(
        &self,
        room_id: &str,
        member: &BatchMember,
        fresh_token: &str,
        at: DateTime<Utc>,
    ) -> ClassResult<Assignment>;

    /// Marks a token redeemed. `false` if it was already used or unknown.
    async fn redeem_invite_token(&self, token: &str, at: DateTime<Utc>) -> ClassResult<bool>;

    /// Whether a per-session fee is outstanding for this participant (for a
    /// parent, for any linked child).
    async fn has_unpaid_session_fee(&self, room_id: &str, email: &str) -> ClassResult<bool>;

    async fn attendance_join_count(&self, room_id: &str, email: &str) -> ClassResult<i32>;

    async fn record_attendance(
        &self,
        room_id: &str,
        email: &str,
        kind: AttendanceKind,
        at: DateTime<Utc>,
    ) -> ClassResult<()>;
}

/// Write-once idempotency ledger for notification sends.
#[async_trait]
pub trait NotificationLedger: Send + Sync {
    /// Whether this key is settled for the day: at least one row exists and
    /// none of them is a pending claim older than `stale_after`.
    async fn key_used_on(
        &self,
        template_type: &str,
        dedup_key: &str,
        day: NaiveDate,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> ClassResult<bool>;

    /// Atomically inserts a pending row for the claim. Returns the row id
    /// when this caller owns the send. A pending row older than
    /// `stale_after` is taken over; any other existing row wins.
    async fn try_claim(
        &self,
        claim: &LedgerClaim,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> ClassResult<Option<Uuid>>;

    async fn complete(&self, claim_id: Uuid, outcome: &DeliveryOutcome, at: DateTime<Utc>) -> ClassResult<()>;

    async fn status_counts(&self, dedup_prefix: &str) -> ClassResult<ReminderCounts>;
}

#[async_trait]
pub trait VideoProvider: Send + Sync {
    /// Creates the room if missing. Returns `true` only when this call created
    /// it; an existing room is not an error.
    async fn ensure_room(&self, room: &str, metadata: &serde_json::Value, max_participants: i32)
        -> ClassResult<bool>;

    async fn mint_join_credential(
        &self,
        room: &str,
        identity: &str,
        display_name: &str,
        grants: &JoinGrants,
        metadata: &serde_json::Value,
        ttl: Duration,
    ) -> ClassResult<MintedCredential>;

    async fn list_live_participants(&self, room: &str) -> ClassResult<Vec<LiveParticipant>>;
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, notification: &Notification) -> ClassResult<DispatchReceipt>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
