//! # Lifecycle Controller
//!
//! Owns the `scheduled → live → ended` / `→ cancelled` state machine for
//! sessions and rooms. Every status write is a compare-and-set against the
//! expected source states, which makes this the single serialization point
//! for a class: two scanners racing to start the same session produce one
//! transition and one audit event.
//!
//! Reads go through here too so that live classes whose time has elapsed
//! are ended as soon as anyone looks at them.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{EngineContext, TimetableNotifier};
use crate::errors::{ClassError, ClassResult};
use crate::identity;
use crate::models::{
    Actor, Assignment, LifecycleTarget, NewRoom, NewRoomEvent, NewSession, PaymentStatus, Role, Room,
    RoomEvent, Session, SessionFilter, SessionStatus,
};
use crate::ports::{ScheduleChange, StatusChange};
use crate::windows::{resolve_local, session_ends_at, windows};

const DEFAULT_MAX_PARTICIPANTS: i32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    GoLive,
    End,
    Cancel,
}

impl Transition {
    fn sources(&self) -> &'static [SessionStatus] {
        match self {
            Transition::GoLive => &[SessionStatus::Scheduled],
            Transition::End => &[SessionStatus::Live],
            Transition::Cancel => &[SessionStatus::Scheduled, SessionStatus::Live],
        }
    }

    fn destination(&self) -> SessionStatus {
        match self {
            Transition::GoLive => SessionStatus::Live,
            Transition::End => SessionStatus::Ended,
            Transition::Cancel => SessionStatus::Cancelled,
        }
    }

    fn event_type(&self) -> &'static str {
        match self {
            Transition::GoLive => "went_live",
            Transition::End => "ended",
            Transition::Cancel => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "status", rename_all = "snake_case")]
pub enum TransitionOutcome {
    Applied(SessionStatus),
    /// Already in the requested state; nothing was written.
    Unchanged(SessionStatus),
}

impl TransitionOutcome {
    pub fn status(&self) -> SessionStatus {
        match self {
            TransitionOutcome::Applied(status) | TransitionOutcome::Unchanged(status) => *status,
        }
    }
}

/// Subset of a session or room needed to authorize and gate a change.
struct Subject {
    status: SessionStatus,
    teacher_email: String,
    created_by: String,
    batch_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct LifecycleController {
    ctx: EngineContext,
    timetable: Option<TimetableNotifier>,
}

impl LifecycleController {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx, timetable: None }
    }

    /// Attaches the debounced timetable notifier fed by reschedules.
    pub fn with_timetable(mut self, timetable: TimetableNotifier) -> Self {
        self.timetable = Some(timetable);
        self
    }

    pub async fn create_session(&self, new: NewSession, actor: &Actor) -> ClassResult<Session> {
        require_scheduler(actor)?;
        require_text("subject", &new.subject)?;
        require_text("teacher_email", &new.teacher_email)?;

        let config = &self.ctx.config;
        let teaching_minutes = new.teaching_minutes.unwrap_or(new.duration_minutes);
        let prep_buffer_minutes = new
            .prep_buffer_minutes
            .unwrap_or(config.early_join_minutes as i32);
        if teaching_minutes <= 0 || teaching_minutes > new.duration_minutes {
            return Err(ClassError::Validation(format!(
                "teaching minutes must be within 1..={}, got {}",
                new.duration_minutes, teaching_minutes
            )));
        }
        if prep_buffer_minutes < 0 {
            return Err(ClassError::Validation("prep buffer cannot be negative".into()));
        }

        let scheduled_start = resolve_local(config.timezone, new.scheduled_date.and_time(new.start_time))?;
        let window = windows(
            scheduled_start,
            new.duration_minutes,
            config.early_join_minutes,
            config.grace_minutes,
        )?;

        let now = self.ctx.clock.now();
        let video_room_name = identity::video_room_name(new.scheduled_date, new.start_time);
        let session = Session {
            session_id: Uuid::new_v4(),
            batch_id: new.batch_id,
            subject: new.subject.clone(),
            teacher_email: new.teacher_email.clone(),
            teacher_name: new.teacher_name.clone(),
            scheduled_date: new.scheduled_date,
            start_time: new.start_time,
            duration_minutes: new.duration_minutes,
            teaching_minutes,
            prep_buffer_minutes,
            status: SessionStatus::Scheduled,
            video_room_name: video_room_name.clone(),
            started_at: None,
            ended_at: None,
            cancelled_at: None,
            cancel_reason: None,
            created_by: actor.label(),
            created_at: now,
        };
        let room = Room {
            room_id: video_room_name.clone(),
            room_name: format!("{} ({})", new.subject, new.scheduled_date),
            subject: new.subject,
            teacher_email: new.teacher_email.clone(),
            status: SessionStatus::Scheduled,
            scheduled_start,
            duration_minutes: new.duration_minutes,
            open_at: window.open_at,
            expires_at: window.expires_at,
            max_participants: new.max_participants.unwrap_or(DEFAULT_MAX_PARTICIPANTS),
            batch_id: Some(new.batch_id),
            session_id: Some(session.session_id),
            created_by: actor.label(),
            created_at: now,
            started_at: None,
            ended_at: None,
        };
        let teacher = teacher_assignment(&room.room_id, &new.teacher_email, &new.teacher_name, now);
        let event = NewRoomEvent::new(
            "created",
            actor,
            json!({ "scheduled_start": scheduled_start, "duration_minutes": room.duration_minutes }),
            now,
        );

        self.ctx.store.create_session(&session, &room, &teacher, &event).await?;
        info!(session_id = %session.session_id, room_id = %room.room_id, "Session scheduled");
        Ok(session)
    }

    pub async fn create_room(&self, new: NewRoom, actor: &Actor) -> ClassResult<Room> {
        require_scheduler(actor)?;
        require_text("room_name", &new.room_name)?;
        require_text("teacher_email", &new.teacher_email)?;

        let config = &self.ctx.config;
        let window = windows(
            new.scheduled_start,
            new.duration_minutes,
            config.early_join_minutes,
            config.grace_minutes,
        )?;
        let local_start = new.scheduled_start.with_timezone(&config.timezone).naive_local();
        let now = self.ctx.clock.now();
        let room = Room {
            room_id: identity::video_room_name(local_start.date(), local_start.time()),
            room_name: new.room_name,
            subject: new.subject,
            teacher_email: new.teacher_email.clone(),
            status: SessionStatus::Scheduled,
            scheduled_start: new.scheduled_start,
            duration_minutes: new.duration_minutes,
            open_at: window.open_at,
            expires_at: window.expires_at,
            max_participants: new.max_participants.unwrap_or(DEFAULT_MAX_PARTICIPANTS),
            batch_id: new.batch_id,
            session_id: None,
            created_by: actor.label(),
            created_at: now,
            started_at: None,
            ended_at: None,
        };
        let teacher = teacher_assignment(&room.room_id, &new.teacher_email, &new.teacher_name, now);
        let event = NewRoomEvent::new(
            "created",
            actor,
            json!({ "scheduled_start": room.scheduled_start, "duration_minutes": room.duration_minutes }),
            now,
        );

        self.ctx.store.create_room(&room, &teacher, &event).await?;
        info!(room_id = %room.room_id, "Standalone room created");
        Ok(room)
    }

    /// Applies a transition. Going live on a live record succeeds without
    /// writing anything; any other transition from a state that does not
    /// allow it is a `Conflict`.
    pub async fn transition(
        &self,
        target: &LifecycleTarget,
        transition: Transition,
        actor: &Actor,
        reason: Option<String>,
    ) -> ClassResult<TransitionOutcome> {
        let subject = self.subject(target).await?;
        authorize(transition, actor, &subject)?;

        let destination = transition.destination();
        if transition == Transition::GoLive && subject.status == SessionStatus::Live {
            debug!(%target, "Already live");
            return Ok(TransitionOutcome::Unchanged(SessionStatus::Live));
        }
        if !transition.sources().contains(&subject.status) {
            return Err(ClassError::conflict(target.to_string(), subject.status));
        }

        let now = self.ctx.clock.now();
        let change = StatusChange {
            target: target.clone(),
            from: transition.sources().to_vec(),
            to: destination,
            at: now,
            cancel_reason: reason.clone(),
            event: NewRoomEvent::new(
                transition.event_type(),
                actor,
                json!({ "from": subject.status, "reason": reason }),
                now,
            ),
        };

        if self.ctx.store.apply_status_change(&change).await? {
            info!(%target, from = %subject.status, to = %destination, actor = %actor.label(), "Transition applied");
            return Ok(TransitionOutcome::Applied(destination));
        }

        // Lost a race; report what the winner left behind.
        let current = self
            .ctx
            .store
            .current_status(target)
            .await?
            .ok_or_else(|| ClassError::NotFound(target.to_string()))?;
        if transition == Transition::GoLive && current == SessionStatus::Live {
            return Ok(TransitionOutcome::Unchanged(current));
        }
        Err(ClassError::conflict(target.to_string(), current))
    }

    pub async fn go_live(&self, target: &LifecycleTarget, actor: &Actor) -> ClassResult<TransitionOutcome> {
        self.transition(target, Transition::GoLive, actor, None).await
    }

    pub async fn end(&self, target: &LifecycleTarget, actor: &Actor) -> ClassResult<TransitionOutcome> {
        self.transition(target, Transition::End, actor, None).await
    }

    pub async fn cancel(
        &self,
        target: &LifecycleTarget,
        actor: &Actor,
        reason: Option<String>,
    ) -> ClassResult<TransitionOutcome> {
        self.transition(target, Transition::Cancel, actor, reason).await
    }

    /// Moves a still-scheduled class. Windows are recomputed from the new
    /// start and duration and stored together with it.
    pub async fn reschedule(
        &self,
        target: &LifecycleTarget,
        scheduled_date: NaiveDate,
        start_time: NaiveTime,
        duration_minutes: i32,
        actor: &Actor,
    ) -> ClassResult<Room> {
        let subject = self.subject(target).await?;
        let owns = match actor {
            Actor::Person { email, role } => role.is_administrative() || *email == subject.created_by,
            Actor::System { .. } => true,
        };
        if !owns {
            return Err(ClassError::Forbidden("only the scheduling owner can edit this class".into()));
        }
        if subject.status != SessionStatus::Scheduled {
            return Err(ClassError::conflict(target.to_string(), subject.status));
        }

        let config = &self.ctx.config;
        let scheduled_start = resolve_local(config.timezone, scheduled_date.and_time(start_time))?;
        let window = windows(
            scheduled_start,
            duration_minutes,
            config.early_join_minutes,
            config.grace_minutes,
        )?;
        let now = self.ctx.clock.now();
        let change = ScheduleChange {
            target: target.clone(),
            scheduled_date,
            start_time,
            scheduled_start,
            duration_minutes,
            open_at: window.open_at,
            expires_at: window.expires_at,
            event: NewRoomEvent::new(
                "rescheduled",
                actor,
                json!({ "scheduled_start": scheduled_start, "duration_minutes": duration_minutes }),
                now,
            ),
        };

        if !self.ctx.store.update_schedule(&change).await? {
            let current = self
                .ctx
                .store
                .current_status(target)
                .await?
                .ok_or_else(|| ClassError::NotFound(target.to_string()))?;
            return Err(ClassError::conflict(target.to_string(), current));
        }
        info!(%target, %scheduled_start, duration_minutes, "Class rescheduled");

        if let (Some(timetable), Some(batch_id)) = (&self.timetable, subject.batch_id) {
            timetable.schedule_changed(batch_id);
        }

        let room_id = self.room_id_of(target).await?;
        self.get_room(&room_id).await
    }

    pub async fn get_session(&self, session_id: Uuid) -> ClassResult<Session> {
        let session = self
            .ctx
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| ClassError::NotFound(format!("session {}", session_id)))?;
        self.heal_session(session).await
    }

    pub async fn get_room(&self, room_id: &str) -> ClassResult<Room> {
        let room = self
            .ctx
            .store
            .get_room(room_id)
            .await?
            .ok_or_else(|| ClassError::NotFound(format!("room {}", room_id)))?;
        self.heal_room(room).await
    }

    pub async fn list_sessions(&self, filter: &SessionFilter) -> ClassResult<Vec<Session>> {
        let sessions = self.ctx.store.list_sessions(filter).await?;
        let mut healed = Vec::with_capacity(sessions.len());
        for session in sessions {
            let session = self.heal_session(session).await?;
            // Healing can move a session out of the requested statuses.
            if filter.matches(&session) {
                healed.push(session);
            }
        }
        Ok(healed)
    }

    pub async fn list_rooms(&self, statuses: &[SessionStatus]) -> ClassResult<Vec<Room>> {
        let rooms = self.ctx.store.list_rooms(statuses).await?;
        let mut healed = Vec::with_capacity(rooms.len());
        for room in rooms {
            let room = self.heal_room(room).await?;
            if statuses.is_empty() || statuses.contains(&room.status) {
                healed.push(room);
            }
        }
        Ok(healed)
    }

    /// Ends every live room whose class time has elapsed. Returns how many
    /// this call ended.
    pub async fn sweep_overdue(&self) -> ClassResult<usize> {
        let now = self.ctx.clock.now();
        let mut ended = 0;
        for room in self.ctx.store.list_rooms(&[SessionStatus::Live]).await? {
            if room.is_overdue(now) && self.auto_end(&LifecycleTarget::Room(room.room_id.clone())).await? {
                ended += 1;
            }
        }
        if ended > 0 {
            info!(ended, "Overdue sweep ended live classes");
        }
        Ok(ended)
    }

    pub async fn events(&self, target: &LifecycleTarget) -> ClassResult<Vec<RoomEvent>> {
        self.subject(target).await?;
        self.ctx.store.events(target).await
    }

    async fn heal_session(&self, mut session: Session) -> ClassResult<Session> {
        if session.status == SessionStatus::Live
            && self.ctx.clock.now() > session_ends_at(self.ctx.config.timezone, &session)?
            && self.auto_end(&LifecycleTarget::Session(session.session_id)).await?
        {
            session.status = SessionStatus::Ended;
            session.ended_at = Some(self.ctx.clock.now());
        }
        Ok(session)
    }

    async fn heal_room(&self, mut room: Room) -> ClassResult<Room> {
        let now = self.ctx.clock.now();
        if room.is_overdue(now) && self.auto_end(&LifecycleTarget::Room(room.room_id.clone())).await? {
            room.status = SessionStatus::Ended;
            room.ended_at = Some(now);
        }
        Ok(room)
    }

    /// Ends a live record on behalf of the system. A concurrent writer
    /// getting there first is not an error.
    async fn auto_end(&self, target: &LifecycleTarget) -> ClassResult<bool> {
        let now = self.ctx.clock.now();
        let actor = Actor::system("auto_heal");
        let change = StatusChange {
            target: target.clone(),
            from: vec![SessionStatus::Live],
            to: SessionStatus::Ended,
            at: now,
            cancel_reason: None,
            event: NewRoomEvent::new("ended", &actor, json!({ "reason": "class_time_elapsed" }), now),
        };
        let applied = self.ctx.store.apply_status_change(&change).await?;
        if applied {
            info!(%target, "Auto-ended class after its scheduled time");
        } else {
            warn!(%target, "Auto-end skipped, status changed concurrently");
        }
        Ok(applied)
    }

    async fn subject(&self, target: &LifecycleTarget) -> ClassResult<Subject> {
        match target {
            LifecycleTarget::Session(id) => {
                let session = self
                    .ctx
                    .store
                    .get_session(*id)
                    .await?
                    .ok_or_else(|| ClassError::NotFound(target.to_string()))?;
                Ok(Subject {
                    status: session.status,
                    teacher_email: session.teacher_email,
                    created_by: session.created_by,
                    batch_id: Some(session.batch_id),
                })
            }
            LifecycleTarget::Room(id) => {
                let room = self
                    .ctx
                    .store
                    .get_room(id)
                    .await?
                    .ok_or_else(|| ClassError::NotFound(target.to_string()))?;
                Ok(Subject {
                    status: room.status,
                    teacher_email: room.teacher_email,
                    created_by: room.created_by,
                    batch_id: room.batch_id,
                })
            }
        }
    }

    async fn room_id_of(&self, target: &LifecycleTarget) -> ClassResult<String> {
        match target {
            LifecycleTarget::Room(id) => Ok(id.clone()),
            LifecycleTarget::Session(id) => Ok(self
                .ctx
                .store
                .get_session(*id)
                .await?
                .ok_or_else(|| ClassError::NotFound(target.to_string()))?
                .video_room_name),
        }
    }
}

fn authorize(transition: Transition, actor: &Actor, subject: &Subject) -> ClassResult<()> {
    let (email, role) = match actor {
        Actor::System { .. } => return Ok(()),
        Actor::Person { email, role } => (email, role),
    };
    if role.is_administrative() {
        return Ok(());
    }
    let is_owner_teacher = *role == Role::Teacher && email.eq_ignore_ascii_case(&subject.teacher_email);
    match transition {
        Transition::GoLive | Transition::End if is_owner_teacher => Ok(()),
        _ => Err(ClassError::Forbidden(format!(
            "{} may not {:?} this class",
            role, transition
        ))),
    }
}

fn require_scheduler(actor: &Actor) -> ClassResult<()> {
    match actor {
        Actor::System { .. } => Ok(()),
        Actor::Person { role, .. } if role.is_administrative() => Ok(()),
        Actor::Person { role, .. } => Err(ClassError::Forbidden(format!("{} cannot schedule classes", role))),
    }
}

fn require_text(field: &str, value: &str) -> ClassResult<()> {
    if value.trim().is_empty() {
        return Err(ClassError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn teacher_assignment(room_id: &str, email: &str, name: &str, now: DateTime<Utc>) -> Assignment {
    Assignment {
        id: Uuid::new_v4(),
        room_id: room_id.to_string(),
        participant_email: email.to_string(),
        participant_name: name.to_string(),
        participant_type: Role::Teacher,
        payment_status: PaymentStatus::Exempt,
        join_token: None,
        token_redeemed_at: None,
        joined_at: None,
        left_at: None,
        created_at: now,
    }
}
