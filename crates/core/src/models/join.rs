use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Role, SessionStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    #[default]
    Primary,
    /// Secondary teacher device used for screen sharing.
    Screen,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Primary => "primary",
            Device::Screen => "screen",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackSource {
    Camera,
    Microphone,
    ScreenShare,
    ScreenShareAudio,
}

/// Capabilities embedded in a join credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinGrants {
    pub room: String,
    pub can_publish: bool,
    pub can_publish_sources: Vec<TrackSource>,
    pub can_subscribe: bool,
    pub can_publish_data: bool,
    pub room_admin: bool,
    pub hidden: bool,
}

impl JoinGrants {
    pub fn for_participant(room: &str, role: Role, device: Device) -> Self {
        let base = JoinGrants {
            room: room.to_string(),
            can_publish: false,
            can_publish_sources: Vec::new(),
            can_subscribe: true,
            can_publish_data: false,
            room_admin: false,
            hidden: false,
        };

        match (role, device) {
            (Role::Teacher, Device::Screen) => JoinGrants {
                can_publish: true,
                can_publish_sources: vec![TrackSource::ScreenShare, TrackSource::ScreenShareAudio],
                ..base
            },
            (Role::Teacher, Device::Primary) => JoinGrants {
                can_publish: true,
                can_publish_sources: vec![
                    TrackSource::Camera,
                    TrackSource::Microphone,
                    TrackSource::ScreenShare,
                    TrackSource::ScreenShareAudio,
                ],
                can_publish_data: true,
                room_admin: true,
                ..base
            },
            (Role::Student, _) => JoinGrants {
                can_publish: true,
                can_publish_sources: vec![TrackSource::Camera, TrackSource::Microphone],
                can_publish_data: true,
                ..base
            },
            (Role::Parent, _) => JoinGrants {
                can_publish_data: true,
                ..base
            },
            (Role::Coordinator | Role::AcademicOperator, _) => JoinGrants {
                room_admin: true,
                hidden: true,
                ..base
            },
            (Role::Observer, _) => JoinGrants { hidden: true, ..base },
        }
    }
}

/// Participant currently connected to a provider room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveParticipant {
    pub identity: String,
    #[serde(default)]
    pub tracks: Vec<String>,
}

/// Opaque signed token from the video provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintedCredential {
    pub token: String,
    pub server_url: String,
}

/// Identity already established by the portal login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalIdentity {
    pub email: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallerCredential {
    Session(PortalIdentity),
    InviteToken(String),
    Anonymous,
}

#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub room_id: String,
    pub credential: CallerCredential,
    pub requested_role: Option<Role>,
    pub device: Device,
}

/// Everything a client needs to connect and render its countdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinTicket {
    pub token: String,
    pub server_url: String,
    pub room_id: String,
    pub room_name: String,
    pub identity: String,
    pub participant_name: String,
    pub participant_email: String,
    pub role: Role,
    pub effective_role: Role,
    pub device: Device,
    pub is_rejoin: bool,
    pub status: SessionStatus,
    pub scheduled_start: DateTime<Utc>,
    pub duration_minutes: i32,
    pub open_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
