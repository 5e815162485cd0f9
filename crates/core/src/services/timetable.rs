//! Debounced "timetable updated" notices.
//!
//! A coordinator editing a week of sessions fires one reschedule per
//! session. Each reschedule touches the batch key; once the batch has been
//! quiet for the configured period, everyone in it gets one notice with the
//! upcoming timetable. Sends go through the same ledger as reminders, keyed
//! by a digest of the timetable, so an identical timetable is not re-sent on
//! the same day.

use std::collections::HashSet;
use std::fmt::Write as _;

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{EngineContext, KeyedDebouncer};
use crate::errors::ClassResult;
use crate::models::{
    BatchMember, DeliveryOutcome, LedgerClaim, Notification, PaymentStatus, Priority, Role, Session,
    SessionFilter, SessionStatus, TIMETABLE_TEMPLATE,
};
use crate::windows::local_now;

#[derive(Clone)]
pub struct TimetableNotifier {
    ctx: EngineContext,
    debouncer: KeyedDebouncer<Uuid>,
}

impl TimetableNotifier {
    pub fn new(ctx: EngineContext) -> Self {
        let debouncer = KeyedDebouncer::new(ctx.config.timetable_quiet_period);
        Self { ctx, debouncer }
    }

    /// Records a change to the batch timetable. Must run inside a tokio
    /// runtime.
    pub fn schedule_changed(&self, batch_id: Uuid) {
        let notifier = self.clone();
        self.debouncer.touch(batch_id, move || async move {
            match notifier.notify_batch(batch_id).await {
                Ok(sent) => info!(%batch_id, sent, "Timetable update sent"),
                Err(e) => error!(%batch_id, error = %e, "Timetable update failed"),
            }
        });
    }

    pub fn cancel(&self, batch_id: Uuid) -> bool {
        self.debouncer.cancel(&batch_id)
    }

    pub fn pending(&self) -> usize {
        self.debouncer.pending()
    }

    /// Sends the current timetable to every member of the batch now.
    /// Returns the number of notices accepted by the dispatch service.
    pub async fn notify_batch(&self, batch_id: Uuid) -> ClassResult<usize> {
        let now = self.ctx.clock.now();
        let today = local_now(self.ctx.config.timezone, now).date();
        let filter = SessionFilter {
            from: Some(today),
            to: None,
            statuses: vec![SessionStatus::Scheduled, SessionStatus::Live],
            batch_id: Some(batch_id),
            teacher_email: None,
        };
        let mut sessions = self.ctx.store.list_sessions(&filter).await?;
        sessions.sort_by_key(|s| (s.scheduled_date, s.start_time));

        let mut recipients = self.ctx.store.batch_members(batch_id).await?;
        for session in &sessions {
            recipients.push(BatchMember {
                email: session.teacher_email.clone(),
                name: session.teacher_name.clone(),
                role: Role::Teacher,
                payment_status: PaymentStatus::Exempt,
            });
        }
        let mut seen = HashSet::new();
        recipients.retain(|member| seen.insert(member.email.to_lowercase()));

        let dedup_key = format!("timetable:{}:{}", batch_id, timetable_digest(&sessions));
        let body = render_timetable(&sessions);
        let mut sent = 0;
        for member in recipients {
            if self.notify_member(batch_id, &member, &dedup_key, &body, today).await {
                sent += 1;
            }
        }
        Ok(sent)
    }

    /// One recipient's claim, send and completion. A failure is logged and
    /// leaves the other recipients untouched.
    async fn notify_member(
        &self,
        batch_id: Uuid,
        member: &BatchMember,
        dedup_key: &str,
        body: &str,
        today: NaiveDate,
    ) -> bool {
        let claim = LedgerClaim {
            recipient: member.email.clone(),
            template_type: TIMETABLE_TEMPLATE.to_string(),
            dedup_key: dedup_key.to_string(),
            day: today,
        };
        let claim_id = match self
            .ctx
            .ledger
            .try_claim(&claim, self.ctx.clock.now(), self.ctx.config.stale_claim_after)
            .await
        {
            Ok(Some(id)) => id,
            Ok(None) => return false,
            Err(e) => {
                error!(%batch_id, recipient = %member.email, error = %e, "Could not claim timetable notice");
                return false;
            }
        };

        let notification = Notification {
            recipient: member.email.clone(),
            subject: "Your class timetable has changed".into(),
            body: format!("Hello {},\n\n{}", member.name, body),
            priority: Priority::Normal,
        };
        let outcome = match self.ctx.external_slot().await {
            Ok(_slot) => match self.ctx.dispatcher.send(&notification).await {
                Ok(receipt) if receipt.accepted => DeliveryOutcome::Sent {
                    external_message_id: receipt.external_message_id,
                },
                Ok(_) => DeliveryOutcome::Failed {
                    error: "dispatch service did not accept the message".into(),
                },
                Err(e) => DeliveryOutcome::Failed { error: e.to_string() },
            },
            Err(e) => DeliveryOutcome::Failed { error: e.to_string() },
        };
        let delivered = match &outcome {
            DeliveryOutcome::Sent { .. } => true,
            DeliveryOutcome::Failed { error } => {
                warn!(%batch_id, recipient = %member.email, %error, "Timetable notice failed");
                false
            }
        };
        if let Err(e) = self.ctx.ledger.complete(claim_id, &outcome, self.ctx.clock.now()).await {
            warn!(%claim_id, recipient = %member.email, error = %e, "Could not record timetable notice outcome");
        }
        delivered
    }
}

fn timetable_digest(sessions: &[Session]) -> String {
    let mut hasher = Sha256::new();
    for s in sessions {
        hasher.update(format!("{}|{}|{}|{};", s.session_id, s.scheduled_date, s.start_time, s.duration_minutes));
    }
    hex::encode(hasher.finalize())[..16].to_string()
}

fn render_timetable(sessions: &[Session]) -> String {
    if sessions.is_empty() {
        return "There are no upcoming classes scheduled.\n".to_string();
    }
    let mut out = String::from("Upcoming classes:\n");
    for s in sessions {
        let _ = writeln!(
            out,
            "- {} {} {} ({} min) with {}",
            s.scheduled_date,
            s.start_time.format("%H:%M"),
            s.subject,
            s.duration_minutes,
            s.teacher_name
        );
    }
    out
}
