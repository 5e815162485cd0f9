use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::errors::{ClassError, ClassResult};
use crate::models::{
    Assignment, BatchMember, DeliveryOutcome, LedgerClaim, LifecycleTarget, NewRoomEvent, ReminderCounts, Room,
    RoomEvent, Session, SessionFilter, SessionStatus,
};
use crate::ports::{AttendanceKind, NotificationLedger, ScheduleChange, SessionStore, StatusChange};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct StoreState {
    sessions: HashMap<Uuid, Session>,
    rooms: HashMap<String, Room>,
    assignments: Vec<Assignment>,
    events: Vec<RoomEvent>,
    batches: HashMap<Uuid, Vec<BatchMember>>,
    unpaid_fees: HashSet<(String, String)>,
    join_counts: HashMap<(String, String), i32>,
}

impl StoreState {
    fn push_event(&mut self, room_id: &str, session_id: Option<Uuid>, event: &NewRoomEvent) {
        self.events.push(RoomEvent {
            id: Uuid::new_v4(),
            room_id: room_id.to_string(),
            session_id,
            event_type: event.event_type.clone(),
            actor: event.actor.clone(),
            actor_role: event.actor_role.clone(),
            payload: event.payload.clone(),
            created_at: event.created_at,
        });
    }

    /// Room id and session id linked to a target, if the target exists.
    fn link(&self, target: &LifecycleTarget) -> Option<(String, Option<Uuid>)> {
        match target {
            LifecycleTarget::Session(id) => self
                .sessions
                .get(id)
                .map(|s| (s.video_room_name.clone(), Some(s.session_id))),
            LifecycleTarget::Room(id) => self.rooms.get(id).map(|r| (r.room_id.clone(), r.session_id)),
        }
    }

    fn status_of(&self, target: &LifecycleTarget) -> Option<SessionStatus> {
        match target {
            LifecycleTarget::Session(id) => self.sessions.get(id).map(|s| s.status),
            LifecycleTarget::Room(id) => self.rooms.get(id).map(|r| r.status),
        }
    }

    fn assignment_mut(&mut self, room_id: &str, email: &str) -> Option<&mut Assignment> {
        self.assignments
            .iter_mut()
            .find(|a| a.room_id == room_id && a.participant_email.eq_ignore_ascii_case(email))
    }
}

/// In-memory [`SessionStore`]. One mutex guards all tables, so every
/// trait method is atomic the way a database transaction would be.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_batch_member(&self, batch_id: Uuid, member: BatchMember) {
        guard(&self.state).batches.entry(batch_id).or_default().push(member);
    }

    pub fn mark_fee_unpaid(&self, room_id: &str, email: &str) {
        guard(&self.state)
            .unpaid_fees
            .insert((room_id.to_string(), email.to_lowercase()));
    }

    /// Writes a room directly, bypassing the lifecycle.
    pub fn put_room(&self, room: Room) {
        guard(&self.state).rooms.insert(room.room_id.clone(), room);
    }

    pub fn put_assignment(&self, assignment: Assignment) {
        let mut state = guard(&self.state);
        state
            .assignments
            .retain(|a| !(a.room_id == assignment.room_id && a.participant_email == assignment.participant_email));
        state.assignments.push(assignment);
    }

    pub fn set_room_status(&self, room_id: &str, status: SessionStatus) {
        if let Some(room) = guard(&self.state).rooms.get_mut(room_id) {
            room.status = status;
        }
    }

    pub fn set_session_status(&self, session_id: Uuid, status: SessionStatus) {
        let mut state = guard(&self.state);
        let room_id = state.sessions.get_mut(&session_id).map(|session| {
            session.status = status;
            session.video_room_name.clone()
        });
        if let Some(room) = room_id.and_then(|id| state.rooms.get_mut(&id)) {
            room.status = status;
        }
    }

    pub fn assignments(&self, room_id: &str) -> Vec<Assignment> {
        guard(&self.state)
            .assignments
            .iter()
            .filter(|a| a.room_id == room_id)
            .cloned()
            .collect()
    }

    pub fn all_events(&self) -> Vec<RoomEvent> {
        guard(&self.state).events.clone()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(
        &self,
        session: &Session,
        room: &Room,
        teacher: &Assignment,
        event: &NewRoomEvent,
    ) -> ClassResult<()> {
        let mut state = guard(&self.state);
        if state.rooms.contains_key(&room.room_id) {
            return Err(ClassError::Validation(format!("room {} already exists", room.room_id)));
        }
        state.sessions.insert(session.session_id, session.clone());
        state.rooms.insert(room.room_id.clone(), room.clone());
        state.assignments.push(teacher.clone());
        state.push_event(&room.room_id, Some(session.session_id), event);
        Ok(())
    }

    async fn create_room(&self, room: &Room, teacher: &Assignment, event: &NewRoomEvent) -> ClassResult<()> {
        let mut state = guard(&self.state);
        if state.rooms.contains_key(&room.room_id) {
            return Err(ClassError::Validation(format!("room {} already exists", room.room_id)));
        }
        state.rooms.insert(room.room_id.clone(), room.clone());
        state.assignments.push(teacher.clone());
        state.push_event(&room.room_id, None, event);
        Ok(())
    }

    async fn get_session(&self, session_id: Uuid) -> ClassResult<Option<Session>> {
        Ok(guard(&self.state).sessions.get(&session_id).cloned())
    }

    async fn get_room(&self, room_id: &str) -> ClassResult<Option<Room>> {
        Ok(guard(&self.state).rooms.get(room_id).cloned())
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> ClassResult<Vec<Session>> {
        let mut sessions: Vec<Session> = guard(&self.state)
            .sessions
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| (s.scheduled_date, s.start_time));
        Ok(sessions)
    }

    async fn list_rooms(&self, statuses: &[SessionStatus]) -> ClassResult<Vec<Room>> {
        let mut rooms: Vec<Room> = guard(&self.state)
            .rooms
            .values()
            .filter(|r| statuses.is_empty() || statuses.contains(&r.status))
            .cloned()
            .collect();
        rooms.sort_by_key(|r| r.scheduled_start);
        Ok(rooms)
    }

    async fn scheduled_sessions_on(&self, dates: &[NaiveDate]) -> ClassResult<Vec<Session>> {
        Ok(guard(&self.state)
            .sessions
            .values()
            .filter(|s| s.status == SessionStatus::Scheduled && dates.contains(&s.scheduled_date))
            .cloned()
            .collect())
    }

    async fn sessions_starting_between(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
        statuses: &[SessionStatus],
    ) -> ClassResult<Vec<Session>> {
        Ok(guard(&self.state)
            .sessions
            .values()
            .filter(|s| statuses.contains(&s.status) && s.local_start() >= from && s.local_start() < to)
            .cloned()
            .collect())
    }

    async fn current_status(&self, target: &LifecycleTarget) -> ClassResult<Option<SessionStatus>> {
        Ok(guard(&self.state).status_of(target))
    }

    async fn apply_status_change(&self, change: &StatusChange) -> ClassResult<bool> {
        let mut state = guard(&self.state);
        let Some(current) = state.status_of(&change.target) else {
            return Ok(false);
        };
        if !change.from.contains(&current) {
            return Ok(false);
        }
        let Some((room_id, session_id)) = state.link(&change.target) else {
            return Ok(false);
        };

        if let Some(session) = session_id.and_then(|id| state.sessions.get_mut(&id)) {
            session.status = change.to;
            match change.to {
                SessionStatus::Live => session.started_at = Some(change.at),
                SessionStatus::Ended => session.ended_at = Some(change.at),
                SessionStatus::Cancelled => {
                    session.cancelled_at = Some(change.at);
                    session.cancel_reason = change.cancel_reason.clone();
                }
                SessionStatus::Scheduled => {}
            }
        }
        if let Some(room) = state.rooms.get_mut(&room_id) {
            room.status = change.to;
            match change.to {
                SessionStatus::Live => room.started_at = Some(change.at),
                SessionStatus::Ended | SessionStatus::Cancelled => room.ended_at = Some(change.at),
                SessionStatus::Scheduled => {}
            }
        }
        state.push_event(&room_id, session_id, &change.event);
        Ok(true)
    }

    async fn update_schedule(&self, change: &ScheduleChange) -> ClassResult<bool> {
        let mut state = guard(&self.state);
        if state.status_of(&change.target) != Some(SessionStatus::Scheduled) {
            return Ok(false);
        }
        let Some((room_id, session_id)) = state.link(&change.target) else {
            return Ok(false);
        };
        if let Some(session) = session_id.and_then(|id| state.sessions.get_mut(&id)) {
            session.scheduled_date = change.scheduled_date;
            session.start_time = change.start_time;
            session.duration_minutes = change.duration_minutes;
            session.teaching_minutes = session.teaching_minutes.min(change.duration_minutes);
        }
        if let Some(room) = state.rooms.get_mut(&room_id) {
            room.scheduled_start = change.scheduled_start;
            room.duration_minutes = change.duration_minutes;
            room.open_at = change.open_at;
            room.expires_at = change.expires_at;
        }
        state.push_event(&room_id, session_id, &change.event);
        Ok(true)
    }

    async fn events(&self, target: &LifecycleTarget) -> ClassResult<Vec<RoomEvent>> {
        let state = guard(&self.state);
        Ok(state
            .events
            .iter()
            .filter(|e| match target {
                LifecycleTarget::Session(id) => e.session_id == Some(*id),
                LifecycleTarget::Room(id) => e.room_id == *id,
            })
            .cloned()
            .collect())
    }

    async fn batch_members(&self, batch_id: Uuid) -> ClassResult<Vec<BatchMember>> {
        Ok(guard(&self.state).batches.get(&batch_id).cloned().unwrap_or_default())
    }

    async fn find_assignment(&self, room_id: &str, email: &str) -> ClassResult<Option<Assignment>> {
        Ok(guard(&self.state)
            .assignments
            .iter()
            .find(|a| a.room_id == room_id && a.participant_email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_assignment_by_token(&self, token: &str) -> ClassResult<Option<Assignment>> {
        Ok(guard(&self.state)
            .assignments
            .iter()
            .find(|a| a.join_token.as_deref() == Some(token) && a.token_redeemed_at.is_none())
            .cloned())
    }

    async fn ensure_invite_token(
        &self,
        room_id: &str,
        member: &BatchMember,
        fresh_token: &str,
        at: DateTime<Utc>,
    ) -> ClassResult<Assignment> {
        let mut state = guard(&self.state);
        if let Some(existing) = state.assignment_mut(room_id, &member.email) {
            if existing.join_token.is_none() || existing.token_redeemed_at.is_some() {
                existing.join_token = Some(fresh_token.to_string());
                existing.token_redeemed_at = None;
            }
            return Ok(existing.clone());
        }
        let assignment = Assignment {
            id: Uuid::new_v4(),
            room_id: room_id.to_string(),
            participant_email: member.email.clone(),
            participant_name: member.name.clone(),
            participant_type: member.role,
            payment_status: member.payment_status,
            join_token: Some(fresh_token.to_string()),
            token_redeemed_at: None,
            joined_at: None,
            left_at: None,
            created_at: at,
        };
        state.assignments.push(assignment.clone());
        Ok(assignment)
    }

    async fn redeem_invite_token(&self, token: &str, at: DateTime<Utc>) -> ClassResult<bool> {
        let mut state = guard(&self.state);
        match state
            .assignments
            .iter_mut()
            .find(|a| a.join_token.as_deref() == Some(token) && a.token_redeemed_at.is_none())
        {
            Some(assignment) => {
                assignment.token_redeemed_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn has_unpaid_session_fee(&self, room_id: &str, email: &str) -> ClassResult<bool> {
        Ok(guard(&self.state)
            .unpaid_fees
            .contains(&(room_id.to_string(), email.to_lowercase())))
    }

    async fn attendance_join_count(&self, room_id: &str, email: &str) -> ClassResult<i32> {
        Ok(guard(&self.state)
            .join_counts
            .get(&(room_id.to_string(), email.to_lowercase()))
            .copied()
            .unwrap_or(0))
    }

    async fn record_attendance(
        &self,
        room_id: &str,
        email: &str,
        kind: AttendanceKind,
        at: DateTime<Utc>,
    ) -> ClassResult<()> {
        let mut state = guard(&self.state);
        if kind == AttendanceKind::Joined {
            *state
                .join_counts
                .entry((room_id.to_string(), email.to_lowercase()))
                .or_insert(0) += 1;
        }
        if let Some(assignment) = state.assignment_mut(room_id, email) {
            match kind {
                AttendanceKind::Joined => assignment.joined_at = Some(at),
                AttendanceKind::Left => assignment.left_at = Some(at),
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    pub id: Uuid,
    pub claim: LedgerClaim,
    pub status: &'static str,
    pub claimed_at: DateTime<Utc>,
    pub external_message_id: Option<String>,
    pub error: Option<String>,
}

/// In-memory [`NotificationLedger`] with the same uniqueness rule as the
/// database table: one row per recipient, template, key and day.
#[derive(Default)]
pub struct MemoryLedger {
    rows: Mutex<Vec<LedgerRow>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes reads and claims touching this dedup key or recipient fail
    /// with a database error.
    pub fn fail_for(&self, key_or_recipient: &str) {
        guard(&self.failing).insert(key_or_recipient.to_lowercase());
    }

    fn check_failing(&self, values: &[&str]) -> ClassResult<()> {
        let failing = guard(&self.failing);
        match values.iter().find(|value| failing.contains(&value.to_lowercase())) {
            Some(value) => Err(ClassError::Database(eyre::eyre!("ledger unavailable for {}", value))),
            None => Ok(()),
        }
    }

    pub fn rows(&self) -> Vec<LedgerRow> {
        guard(&self.rows).clone()
    }

    pub fn len(&self) -> usize {
        guard(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        guard(&self.rows).is_empty()
    }
}

fn stale_age(stale_after: Duration) -> ClassResult<chrono::Duration> {
    chrono::Duration::from_std(stale_after)
        .map_err(|e| ClassError::Internal(format!("invalid stale claim age: {}", e)))
}

fn same_claim(a: &LedgerClaim, b: &LedgerClaim) -> bool {
    a.recipient.eq_ignore_ascii_case(&b.recipient)
        && a.template_type == b.template_type
        && a.dedup_key == b.dedup_key
        && a.day == b.day
}

#[async_trait]
impl NotificationLedger for MemoryLedger {
    async fn key_used_on(
        &self,
        template_type: &str,
        dedup_key: &str,
        day: NaiveDate,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> ClassResult<bool> {
        self.check_failing(&[dedup_key])?;
        let stale_after = stale_age(stale_after)?;
        let rows = guard(&self.rows);
        let matching = rows.iter().filter(|row| {
            row.claim.template_type == template_type && row.claim.dedup_key == dedup_key && row.claim.day == day
        });
        let mut any = false;
        for row in matching {
            any = true;
            if row.status == "pending" && row.claimed_at + stale_after <= now {
                return Ok(false);
            }
        }
        Ok(any)
    }

    async fn try_claim(
        &self,
        claim: &LedgerClaim,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> ClassResult<Option<Uuid>> {
        self.check_failing(&[claim.dedup_key.as_str(), claim.recipient.as_str()])?;
        let stale_after = stale_age(stale_after)?;
        let mut rows = guard(&self.rows);
        if let Some(row) = rows.iter_mut().find(|row| same_claim(&row.claim, claim)) {
            if row.status == "pending" && row.claimed_at + stale_after <= now {
                row.claimed_at = now;
                return Ok(Some(row.id));
            }
            return Ok(None);
        }
        let id = Uuid::new_v4();
        rows.push(LedgerRow {
            id,
            claim: claim.clone(),
            status: "pending",
            claimed_at: now,
            external_message_id: None,
            error: None,
        });
        Ok(Some(id))
    }

    async fn complete(&self, claim_id: Uuid, outcome: &DeliveryOutcome, _at: DateTime<Utc>) -> ClassResult<()> {
        let mut rows = guard(&self.rows);
        let row = rows
            .iter_mut()
            .find(|row| row.id == claim_id)
            .ok_or_else(|| ClassError::NotFound(format!("ledger claim {}", claim_id)))?;
        match outcome {
            DeliveryOutcome::Sent { external_message_id } => {
                row.status = "sent";
                row.external_message_id = external_message_id.clone();
            }
            DeliveryOutcome::Failed { error } => {
                row.status = "failed";
                row.error = Some(error.clone());
            }
        }
        Ok(())
    }

    async fn status_counts(&self, dedup_prefix: &str) -> ClassResult<ReminderCounts> {
        let rows = guard(&self.rows);
        let mut counts = ReminderCounts::default();
        for row in rows.iter().filter(|row| row.claim.dedup_key.starts_with(dedup_prefix)) {
            match row.status {
                "sent" => counts.sent += 1,
                "failed" => counts.failed += 1,
                _ => counts.pending += 1,
            }
        }
        Ok(counts)
    }
}
