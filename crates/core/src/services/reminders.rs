//! # Notification Dedup Engine
//!
//! Polled entry point that sends class reminders for every configured
//! [`ReminderWindow`]. On each poll a window selects the sessions whose
//! civil start lies inside a band around `now + minutes_before`, wide
//! enough that at least one tick of the trigger lands inside it.
//!
//! The ledger is the only source of truth for "already sent":
//!
//! 1. sessions that already have any ledger row for `(session, window)` are
//!    skipped outright;
//! 2. every recipient send is preceded by an atomic claim on
//!    `(recipient, template, session+window key, day)`, so two pollers racing
//!    on the same session cannot both send;
//! 3. the claim is completed as `sent` or `failed` once the dispatch
//!    service answers.
//!
//! A process dying between a claim and its completion leaves a pending row.
//! Once that row is older than `stale_claim_after` the session stops
//! counting as settled, the next poll revisits it and takes the stale claim
//! over, possibly sending that recipient a second copy. This is the one
//! accepted at-least-once case; every other path sends each recipient at
//! most one reminder per window.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::EngineContext;
use crate::errors::{ClassError, ClassResult};
use crate::identity;
use crate::models::notification::dedup_prefix;
use crate::models::{
    BatchMember, DeliveryOutcome, LedgerClaim, Notification, PaymentStatus, Priority, ReminderCounts,
    ReminderWindow, Role, Room, Session, SessionStatus, REMINDER_TEMPLATE,
};
use crate::windows::{local_now, reminder_band};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowReport {
    pub label: String,
    pub candidates: usize,
    /// Sessions skipped because the ledger already holds this window.
    pub already_sent: usize,
    pub sent: usize,
    pub failed: usize,
    /// Recipients another poller had already claimed.
    pub suppressed: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderReport {
    pub ran_at: DateTime<Utc>,
    pub windows: Vec<WindowReport>,
}

impl ReminderReport {
    pub fn sent(&self) -> usize {
        self.windows.iter().map(|w| w.sent).sum()
    }

    pub fn failed(&self) -> usize {
        self.windows.iter().map(|w| w.failed).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecipientOutcome {
    Sent,
    Failed,
    Suppressed,
}

#[derive(Clone)]
pub struct ReminderEngine {
    ctx: EngineContext,
}

impl ReminderEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Runs every configured window once. A failing window is reported and
    /// does not stop the others.
    pub async fn run(&self) -> ReminderReport {
        let now = self.ctx.clock.now();
        let mut windows = Vec::with_capacity(self.ctx.config.reminder_windows.len());
        for window in self.ctx.config.reminder_windows.iter() {
            let span = info_span!("reminder_window", window = %window.label);
            let report = match self.run_window(window, now).instrument(span).await {
                Ok(report) => report,
                Err(e) => {
                    error!(window = %window.label, error = %e, "Reminder window failed");
                    WindowReport {
                        label: window.label.clone(),
                        error: Some(e.to_string()),
                        ..WindowReport::default()
                    }
                }
            };
            windows.push(report);
        }
        ReminderReport { ran_at: now, windows }
    }

    /// Ledger-derived counts for one session across all windows.
    pub async fn status_for_session(&self, session_id: Uuid) -> ClassResult<ReminderCounts> {
        self.ctx.ledger.status_counts(&dedup_prefix(session_id)).await
    }

    /// Same counts, addressed by room. Standalone rooms never get reminders.
    pub async fn status_for_room(&self, room_id: &str) -> ClassResult<ReminderCounts> {
        let room = self
            .ctx
            .store
            .get_room(room_id)
            .await?
            .ok_or_else(|| ClassError::NotFound(format!("room {}", room_id)))?;
        match room.session_id {
            Some(session_id) => self.status_for_session(session_id).await,
            None => Ok(ReminderCounts::default()),
        }
    }

    pub async fn run_window(&self, window: &ReminderWindow, now: DateTime<Utc>) -> ClassResult<WindowReport> {
        let now_local = local_now(self.ctx.config.timezone, now);
        let (from, to) = reminder_band(now_local, window.minutes_before, self.ctx.config.reminder_band);
        let statuses: &[SessionStatus] = if window.requires_live {
            &[SessionStatus::Live]
        } else {
            &[SessionStatus::Scheduled, SessionStatus::Live]
        };

        let sessions = self
            .ctx
            .store
            .sessions_starting_between(from, to, statuses)
            .await?;
        let mut report = WindowReport {
            label: window.label.clone(),
            candidates: sessions.len(),
            ..WindowReport::default()
        };

        let mut handles = Vec::new();
        for session in sessions {
            let key = window.dedup_key(session.session_id);
            let used = self
                .ctx
                .ledger
                .key_used_on(
                    REMINDER_TEMPLATE,
                    &key,
                    session.scheduled_date,
                    now,
                    self.ctx.config.stale_claim_after,
                )
                .await;
            match used {
                Ok(false) => {}
                Ok(true) => {
                    debug!(session_id = %session.session_id, "Reminder already sent for this window");
                    report.already_sent += 1;
                    continue;
                }
                Err(e) => {
                    error!(
                        session_id = %session.session_id,
                        window = %window.label,
                        error = %e,
                        "Could not read reminder ledger for session"
                    );
                    report.failed += 1;
                    continue;
                }
            }

            let engine = self.clone();
            let window = window.clone();
            let session_id = session.session_id;
            let span = info_span!("reminder_session", %session_id);
            let handle = tokio::spawn(async move { engine.notify_session(session, window).await }.instrument(span));
            handles.push((session_id, handle));
        }

        for (session_id, handle) in handles {
            match handle.await {
                Ok(Ok(outcomes)) => {
                    for outcome in outcomes {
                        match outcome {
                            RecipientOutcome::Sent => report.sent += 1,
                            RecipientOutcome::Failed => report.failed += 1,
                            RecipientOutcome::Suppressed => report.suppressed += 1,
                        }
                    }
                }
                Ok(Err(e)) => {
                    error!(%session_id, window = %window.label, error = %e, "Reminder fan-out failed for session");
                    report.failed += 1;
                }
                Err(join_error) => {
                    error!(%session_id, window = %window.label, error = %join_error, "Reminder task aborted");
                    report.failed += 1;
                }
            }
        }

        if report.sent + report.failed > 0 {
            info!(
                window = %window.label,
                sent = report.sent,
                failed = report.failed,
                suppressed = report.suppressed,
                "Reminder window processed"
            );
        }
        Ok(report)
    }

    async fn notify_session(&self, session: Session, window: ReminderWindow) -> ClassResult<Vec<RecipientOutcome>> {
        let room = self
            .ctx
            .store
            .get_room(&session.video_room_name)
            .await?
            .ok_or_else(|| ClassError::NotFound(format!("room {}", session.video_room_name)))?;

        let mut recipients = vec![BatchMember {
            email: session.teacher_email.clone(),
            name: session.teacher_name.clone(),
            role: Role::Teacher,
            payment_status: PaymentStatus::Exempt,
        }];
        recipients.extend(self.ctx.store.batch_members(session.batch_id).await?);
        let mut seen = HashSet::new();
        recipients.retain(|member| seen.insert(member.email.to_lowercase()));

        let mut handles = Vec::with_capacity(recipients.len());
        for member in recipients {
            let engine = self.clone();
            let session = session.clone();
            let room = room.clone();
            let window = window.clone();
            handles.push(tokio::spawn(async move {
                engine.notify_recipient(&session, &room, &window, member).await
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(join_error) => {
                    error!(error = %join_error, "Reminder recipient task aborted");
                    outcomes.push(RecipientOutcome::Failed);
                }
            }
        }
        Ok(outcomes)
    }

    async fn notify_recipient(
        &self,
        session: &Session,
        room: &Room,
        window: &ReminderWindow,
        member: BatchMember,
    ) -> RecipientOutcome {
        let now = self.ctx.clock.now();
        let claim = LedgerClaim {
            recipient: member.email.clone(),
            template_type: REMINDER_TEMPLATE.to_string(),
            dedup_key: window.dedup_key(session.session_id),
            day: session.scheduled_date,
        };

        let claim_id = match self
            .ctx
            .ledger
            .try_claim(&claim, now, self.ctx.config.stale_claim_after)
            .await
        {
            Ok(Some(id)) => id,
            Ok(None) => return RecipientOutcome::Suppressed,
            Err(e) => {
                error!(
                    session_id = %session.session_id,
                    recipient = %member.email,
                    window = %window.label,
                    error = %e,
                    "Could not claim reminder in ledger"
                );
                return RecipientOutcome::Failed;
            }
        };

        let outcome = match self.deliver(session, room, window, &member).await {
            Ok(outcome) => outcome,
            Err(e) => DeliveryOutcome::Failed { error: e.to_string() },
        };
        let result = match &outcome {
            DeliveryOutcome::Sent { .. } => RecipientOutcome::Sent,
            DeliveryOutcome::Failed { error } => {
                error!(
                    session_id = %session.session_id,
                    recipient = %member.email,
                    window = %window.label,
                    %error,
                    "Reminder delivery failed"
                );
                RecipientOutcome::Failed
            }
        };

        if let Err(e) = self
            .ctx
            .ledger
            .complete(claim_id, &outcome, self.ctx.clock.now())
            .await
        {
            warn!(%claim_id, recipient = %member.email, error = %e, "Could not record reminder outcome");
        }
        result
    }

    async fn deliver(
        &self,
        session: &Session,
        room: &Room,
        window: &ReminderWindow,
        member: &BatchMember,
    ) -> ClassResult<DeliveryOutcome> {
        let assignment = self
            .ctx
            .store
            .ensure_invite_token(&room.room_id, member, &identity::invite_token(), self.ctx.clock.now())
            .await?;
        let token = assignment.join_token.unwrap_or_default();
        let link = join_link(&self.ctx.config.portal_base_url, &room.room_id, &token);
        let notification = compose_reminder(session, window, member, &link);

        let receipt = {
            let _slot = self.ctx.external_slot().await?;
            self.ctx.dispatcher.send(&notification).await?
        };
        if receipt.accepted {
            Ok(DeliveryOutcome::Sent {
                external_message_id: receipt.external_message_id,
            })
        } else {
            Ok(DeliveryOutcome::Failed {
                error: "dispatch service did not accept the message".into(),
            })
        }
    }
}

pub fn join_link(base_url: &str, room_id: &str, token: &str) -> String {
    format!("{}/join/{}?token={}", base_url.trim_end_matches('/'), room_id, token)
}

fn compose_reminder(session: &Session, window: &ReminderWindow, member: &BatchMember, link: &str) -> Notification {
    let starts = session.start_time.format("%H:%M");
    let (subject, priority) = if window.minutes_before == 0 {
        (format!("{} is starting now", session.subject), Priority::High)
    } else {
        (
            format!("{} starts in {} minutes", session.subject, window.minutes_before),
            Priority::Normal,
        )
    };
    let body = format!(
        "Hello {},\n\n{} with {} is scheduled for {} at {} ({} minutes).\nJoin: {}\n",
        member.name, session.subject, session.teacher_name, session.scheduled_date, starts, session.duration_minutes, link
    );
    Notification {
        recipient: member.email.clone(),
        subject,
        body,
        priority,
    }
}
