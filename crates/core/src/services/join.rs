//! # Join Authorizer
//!
//! Request-time gatekeeper for a room. Resolves who is calling, runs the
//! gates in a fixed order and, once they all pass, mints a provider
//! credential scoped to the caller's role and device.
//!
//! Gate order (first failure wins):
//!
//! 1. identity: portal session or unredeemed invite token
//! 2. room exists
//! 3. room is not ended or cancelled
//! 4. caller belongs to the room
//! 5. fees (students and parents only)
//! 6. room is live, unless the caller is a teacher or observer
//! 7. time window: expired, class time elapsed, too early
//!
//! Nothing here is cached between calls; every request reads fresh state.

use serde_json::json;
use tracing::{debug, info, warn};

use super::{room_metadata, EngineContext};
use crate::errors::{ClassError, ClassResult};
use crate::identity::participant_identity;
use crate::models::{
    Assignment, CallerCredential, Device, JoinGrants, JoinRequest, JoinTicket, PaymentStatus, Role, Room,
    SessionStatus,
};

/// Caller as resolved from either credential form.
#[derive(Debug, Clone)]
struct Caller {
    email: String,
    name: String,
    role: Role,
    assignment: Option<Assignment>,
    invite_token: Option<String>,
}

#[derive(Clone)]
pub struct JoinAuthorizer {
    ctx: EngineContext,
}

impl JoinAuthorizer {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    pub async fn authorize(&self, request: JoinRequest) -> ClassResult<JoinTicket> {
        let caller = self.resolve_caller(&request).await?;

        let room = self
            .ctx
            .store
            .get_room(&request.room_id)
            .await?
            .ok_or_else(|| ClassError::NotFound(format!("room {}", request.room_id)))?;
        if room.status.is_terminal() {
            return Err(ClassError::Gone(room.status));
        }

        let caller = self.check_enrollment(caller, &room).await?;
        self.check_fees(&caller, &room).await?;

        if room.status == SessionStatus::Scheduled && !caller.role.may_enter_before_live() {
            return Err(ClassError::NotLive);
        }
        check_time(&room, self.ctx.clock.now())?;

        let effective_role = effective_role(caller.role, request.requested_role)?;
        if request.device == Device::Screen && effective_role != Role::Teacher {
            return Err(ClassError::Validation("only teachers can join with a screen device".into()));
        }
        let device = self.resolve_device(&room, &caller.email, effective_role, request.device).await;
        let identity = participant_identity(
            &self.ctx.config.identity_key,
            &room.room_id,
            effective_role,
            &caller.email,
            device,
        );
        let is_rejoin = self
            .ctx
            .store
            .attendance_join_count(&room.room_id, &caller.email)
            .await?
            > 0;

        let grants = JoinGrants::for_participant(&room.room_id, effective_role, device);
        let mut metadata = room_metadata(&room);
        if let Some(map) = metadata.as_object_mut() {
            map.insert("role".into(), json!(caller.role));
            map.insert("effective_role".into(), json!(effective_role));
            map.insert("device".into(), json!(device));
            map.insert("participant_email".into(), json!(caller.email));
            map.insert("is_rejoin".into(), json!(is_rejoin));
        }

        let credential = {
            let _slot = self.ctx.external_slot().await?;
            self.ctx
                .video
                .ensure_room(&room.room_id, &room_metadata(&room), room.max_participants)
                .await?;
            self.ctx
                .video
                .mint_join_credential(
                    &room.room_id,
                    &identity,
                    &caller.name,
                    &grants,
                    &metadata,
                    self.ctx.config.join_credential_ttl,
                )
                .await?
        };

        // Burn the invite token last so a failed gate leaves it usable.
        if let Some(token) = &caller.invite_token {
            if !self
                .ctx
                .store
                .redeem_invite_token(token, self.ctx.clock.now())
                .await?
            {
                warn!(room_id = %room.room_id, "Invite token redeemed concurrently");
                return Err(ClassError::AuthenticationRequired);
            }
        }

        info!(
            room_id = %room.room_id,
            %identity,
            role = %caller.role,
            effective_role = %effective_role,
            device = device.as_str(),
            is_rejoin,
            "Join authorized"
        );
        Ok(JoinTicket {
            token: credential.token,
            server_url: credential.server_url,
            room_id: room.room_id,
            room_name: room.room_name,
            identity,
            participant_name: caller.name,
            participant_email: caller.email,
            role: caller.role,
            effective_role,
            device,
            is_rejoin,
            status: room.status,
            scheduled_start: room.scheduled_start,
            duration_minutes: room.duration_minutes,
            open_at: room.open_at,
            expires_at: room.expires_at,
        })
    }

    async fn resolve_caller(&self, request: &JoinRequest) -> ClassResult<Caller> {
        match &request.credential {
            CallerCredential::Session(identity) => Ok(Caller {
                email: identity.email.clone(),
                name: identity.name.clone(),
                role: identity.role,
                assignment: None,
                invite_token: None,
            }),
            CallerCredential::InviteToken(token) => {
                let assignment = self
                    .ctx
                    .store
                    .find_assignment_by_token(token)
                    .await?
                    .ok_or(ClassError::AuthenticationRequired)?;
                // Tokens are bound to one room.
                if assignment.room_id != request.room_id {
                    debug!(room_id = %request.room_id, "Invite token presented for another room");
                    return Err(ClassError::AuthenticationRequired);
                }
                Ok(Caller {
                    email: assignment.participant_email.clone(),
                    name: assignment.participant_name.clone(),
                    role: assignment.participant_type,
                    invite_token: Some(token.clone()),
                    assignment: Some(assignment),
                })
            }
            CallerCredential::Anonymous => Err(ClassError::AuthenticationRequired),
        }
    }

    /// Students and parents need an assignment or batch membership. Teachers
    /// must teach the room or be assigned to it. Observer roles may enter
    /// any room.
    async fn check_enrollment(&self, mut caller: Caller, room: &Room) -> ClassResult<Caller> {
        if caller.role.is_observer_capable() {
            return Ok(caller);
        }
        if caller.assignment.is_none() {
            caller.assignment = self.ctx.store.find_assignment(&room.room_id, &caller.email).await?;
        }
        if caller.assignment.is_some() {
            return Ok(caller);
        }
        if caller.role == Role::Teacher && caller.email.eq_ignore_ascii_case(&room.teacher_email) {
            return Ok(caller);
        }
        if let Some(batch_id) = room.batch_id {
            let member = self
                .ctx
                .store
                .batch_members(batch_id)
                .await?
                .into_iter()
                .find(|m| m.email.eq_ignore_ascii_case(&caller.email) && m.role == caller.role);
            if let Some(member) = member {
                // Not yet invited: the batch roster still carries payment state.
                caller.assignment = Some(Assignment {
                    id: uuid::Uuid::nil(),
                    room_id: room.room_id.clone(),
                    participant_email: member.email,
                    participant_name: member.name,
                    participant_type: member.role,
                    payment_status: member.payment_status,
                    join_token: None,
                    token_redeemed_at: None,
                    joined_at: None,
                    left_at: None,
                    created_at: room.created_at,
                });
                return Ok(caller);
            }
        }
        Err(ClassError::Forbidden(format!("{} is not enrolled in this class", caller.email)))
    }

    async fn check_fees(&self, caller: &Caller, room: &Room) -> ClassResult<()> {
        if !caller.role.is_fee_gated() {
            return Ok(());
        }
        let status = caller
            .assignment
            .as_ref()
            .map(|a| a.payment_status)
            .unwrap_or(PaymentStatus::Unknown);
        if status.blocks_join() {
            return Err(ClassError::PaymentRequired(format!("payment status is {}", status)));
        }
        if self
            .ctx
            .store
            .has_unpaid_session_fee(&room.room_id, &caller.email)
            .await?
        {
            return Err(ClassError::PaymentRequired("session fee is unpaid".into()));
        }
        Ok(())
    }

    /// A teacher whose primary device is already in the room joins the
    /// second device as a screen-share device.
    async fn resolve_device(&self, room: &Room, email: &str, role: Role, requested: Device) -> Device {
        if role != Role::Teacher || requested != Device::Primary {
            return requested;
        }
        let primary = participant_identity(&self.ctx.config.identity_key, &room.room_id, role, email, Device::Primary);
        let participants = match self.ctx.external_slot().await {
            Ok(_slot) => self.ctx.video.list_live_participants(&room.room_id).await,
            Err(e) => Err(e),
        };
        match participants {
            Ok(participants) if participants.iter().any(|p| p.identity == primary) => {
                info!(room_id = %room.room_id, "Teacher already present, promoting to screen device");
                Device::Screen
            }
            Ok(_) => Device::Primary,
            Err(e) => {
                warn!(room_id = %room.room_id, error = %e, "Could not list participants, keeping primary device");
                Device::Primary
            }
        }
    }
}

/// Time gate. Expiry is checked first so that a request after the grace
/// period always reads as expired.
pub fn check_time(room: &Room, now: chrono::DateTime<chrono::Utc>) -> ClassResult<()> {
    if now > room.expires_at {
        return Err(ClassError::Expired(room.expires_at));
    }
    let class_end = room.class_ends_at();
    if now > class_end {
        return Err(ClassError::ClassEnded(class_end));
    }
    if now < room.open_at {
        return Err(ClassError::TooEarly(room.open_at));
    }
    Ok(())
}

/// Only observer roles may act as another observer role.
fn effective_role(native: Role, requested: Option<Role>) -> ClassResult<Role> {
    match requested {
        None => Ok(native),
        Some(role) if role == native => Ok(native),
        Some(role) if native.is_observer_capable() && role.is_observer_capable() => Ok(role),
        Some(role) => Err(ClassError::Forbidden(format!("{} cannot join as {}", native, role))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_override_cannot_escalate() {
        assert_eq!(effective_role(Role::Coordinator, Some(Role::Observer)).unwrap(), Role::Observer);
        assert_eq!(effective_role(Role::Student, None).unwrap(), Role::Student);
        assert!(matches!(
            effective_role(Role::Student, Some(Role::Coordinator)),
            Err(ClassError::Forbidden(_))
        ));
        assert!(matches!(
            effective_role(Role::Observer, Some(Role::Teacher)),
            Err(ClassError::Forbidden(_))
        ));
    }
}
