use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Role;

/// Who is driving a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    Person { email: String, role: Role },
    /// Internal component such as the auto-start scanner.
    System { component: String },
}

impl Actor {
    pub fn person(email: impl Into<String>, role: Role) -> Self {
        Actor::Person {
            email: email.into(),
            role,
        }
    }

    pub fn system(component: impl Into<String>) -> Self {
        Actor::System {
            component: component.into(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Actor::Person { email, .. } => email.clone(),
            Actor::System { component } => format!("system:{}", component),
        }
    }

    pub fn role_label(&self) -> &str {
        match self {
            Actor::Person { role, .. } => role.as_str(),
            Actor::System { .. } => "system",
        }
    }
}

/// The record a lifecycle command is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum LifecycleTarget {
    Session(Uuid),
    Room(String),
}

impl fmt::Display for LifecycleTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleTarget::Session(id) => write!(f, "session {}", id),
            LifecycleTarget::Room(id) => write!(f, "room {}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRoomEvent {
    pub event_type: String,
    pub actor: String,
    pub actor_role: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl NewRoomEvent {
    pub fn new(event_type: &str, actor: &Actor, payload: serde_json::Value, at: DateTime<Utc>) -> Self {
        Self {
            event_type: event_type.to_string(),
            actor: actor.label(),
            actor_role: actor.role_label().to_string(),
            payload,
            created_at: at,
        }
    }
}

/// Row of the append-only audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomEvent {
    pub id: Uuid,
    pub room_id: String,
    pub session_id: Option<Uuid>,
    pub event_type: String,
    pub actor: String,
    pub actor_role: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
