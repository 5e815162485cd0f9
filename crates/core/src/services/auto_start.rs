//! # Auto-Start Scanner
//!
//! Polled entry point that promotes sessions whose prep window has opened.
//! For each due session, in order: provision the provider room, move the
//! session to `live`, then issue invite credentials to everyone attached to
//! the batch. Candidates are processed concurrently and independently; a
//! failure on one is recorded in the report and never stops the others.
//!
//! Re-running a scan is harmless: only `scheduled` sessions are selected and
//! the go-live transition is a compare-and-set, so a session that another
//! scan already started comes back as [`ScanOutcome::AlreadyLive`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::{room_metadata, EngineContext, LifecycleController, TransitionOutcome};
use crate::errors::{ClassError, ClassResult};
use crate::identity;
use crate::models::{Actor, BatchMember, LifecycleTarget, PaymentStatus, Role, Session};
use crate::windows::{local_now, session_ends_at};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanOutcome {
    Started {
        session_id: Uuid,
        room_id: String,
        credentials_issued: usize,
        credential_failures: usize,
    },
    AlreadyLive {
        session_id: Uuid,
    },
    /// Due, but the whole class time passed before any scan saw it. Only
    /// the first poll after the class end reports it.
    Elapsed {
        session_id: Uuid,
    },
    Failed {
        session_id: Uuid,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub scanned_at: DateTime<Utc>,
    pub candidates: usize,
    pub outcomes: Vec<ScanOutcome>,
}

impl ScanReport {
    pub fn started(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ScanOutcome::Started { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ScanOutcome::Failed { .. }))
            .count()
    }
}

enum Pending {
    Elapsed,
    Failed(String),
    Task(JoinHandle<ClassResult<ScanOutcome>>),
}

#[derive(Clone)]
pub struct AutoStartScanner {
    ctx: EngineContext,
    lifecycle: LifecycleController,
}

impl AutoStartScanner {
    pub fn new(ctx: EngineContext, lifecycle: LifecycleController) -> Self {
        Self { ctx, lifecycle }
    }

    pub async fn scan(&self) -> ClassResult<ScanReport> {
        let now = self.ctx.clock.now();
        let now_local = local_now(self.ctx.config.timezone, now);
        let today = now_local.date();
        // A prep window can open before midnight for a class just after it.
        let mut dates = vec![today];
        dates.extend(today.succ_opt());

        let due: Vec<Session> = self
            .ctx
            .store
            .scheduled_sessions_on(&dates)
            .await?
            .into_iter()
            .filter(|session| now_local >= session.prep_opens_at())
            .collect();

        let mut pending = Vec::with_capacity(due.len());
        for session in due {
            let session_id = session.session_id;
            match session_ends_at(self.ctx.config.timezone, &session) {
                Ok(ends_at) if now >= ends_at => {
                    // Reported once, on the poll its class time runs out.
                    let newly = (now - ends_at)
                        .to_std()
                        .map_or(true, |since| since < self.ctx.config.poll_interval);
                    if newly {
                        warn!(%session_id, "Session was never started and its class time has passed");
                        pending.push((session_id, Pending::Elapsed));
                    } else {
                        debug!(%session_id, "Skipping elapsed session");
                    }
                }
                Ok(_) => {
                    let scanner = self.clone();
                    let span = info_span!("auto_start", %session_id, room_id = %session.video_room_name);
                    let handle = tokio::spawn(async move { scanner.start_one(session).await }.instrument(span));
                    pending.push((session_id, Pending::Task(handle)));
                }
                Err(e) => {
                    error!(%session_id, error = %e, "Session start cannot be resolved");
                    pending.push((session_id, Pending::Failed(e.to_string())));
                }
            }
        }

        let candidates = pending.len();
        if candidates > 0 {
            info!(candidates, %now_local, "Auto-start scan found due sessions");
        }

        let mut outcomes = Vec::with_capacity(candidates);
        for (session_id, pending) in pending {
            let outcome = match pending {
                Pending::Elapsed => ScanOutcome::Elapsed { session_id },
                Pending::Failed(error) => ScanOutcome::Failed { session_id, error },
                Pending::Task(handle) => match handle.await {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(e)) => {
                        if e.is_expected() {
                            warn!(%session_id, error = %e, "Auto-start skipped session");
                        } else {
                            error!(%session_id, error = %e, "Auto-start failed for session");
                        }
                        ScanOutcome::Failed {
                            session_id,
                            error: e.to_string(),
                        }
                    }
                    Err(join_error) => {
                        error!(%session_id, error = %join_error, "Auto-start task aborted");
                        ScanOutcome::Failed {
                            session_id,
                            error: join_error.to_string(),
                        }
                    }
                },
            };
            outcomes.push(outcome);
        }

        Ok(ScanReport {
            scanned_at: now,
            candidates,
            outcomes,
        })
    }

    /// Ensure room, go live, issue credentials. Strictly in that order.
    async fn start_one(&self, session: Session) -> ClassResult<ScanOutcome> {
        let room = self
            .ctx
            .store
            .get_room(&session.video_room_name)
            .await?
            .ok_or_else(|| ClassError::NotFound(format!("room {}", session.video_room_name)))?;

        {
            let _slot = self.ctx.external_slot().await?;
            self.ctx
                .video
                .ensure_room(&room.room_id, &room_metadata(&room), room.max_participants)
                .await?;
        }

        let target = LifecycleTarget::Session(session.session_id);
        match self.lifecycle.go_live(&target, &Actor::system("auto_start")).await? {
            TransitionOutcome::Applied(_) => {}
            TransitionOutcome::Unchanged(_) => {
                info!("Session already live, nothing to do");
                return Ok(ScanOutcome::AlreadyLive {
                    session_id: session.session_id,
                });
            }
        }

        let mut members = vec![BatchMember {
            email: session.teacher_email.clone(),
            name: session.teacher_name.clone(),
            role: Role::Teacher,
            payment_status: PaymentStatus::Exempt,
        }];
        members.extend(self.ctx.store.batch_members(session.batch_id).await?);

        let now = self.ctx.clock.now();
        let mut issued = 0;
        let mut failures = 0;
        for member in &members {
            match self
                .ctx
                .store
                .ensure_invite_token(&room.room_id, member, &identity::invite_token(), now)
                .await
            {
                Ok(_) => issued += 1,
                Err(e) => {
                    failures += 1;
                    error!(recipient = %member.email, role = %member.role, error = %e, "Failed to issue join credential");
                }
            }
        }

        info!(issued, failures, "Session auto-started");
        Ok(ScanOutcome::Started {
            session_id: session.session_id,
            room_id: room.room_id,
            credentials_issued: issued,
            credential_failures: failures,
        })
    }
}
