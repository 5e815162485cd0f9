use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ClassError;

/// Every role that can be attached to a room, either through an
/// assignment or through a portal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Teacher,
    Student,
    Parent,
    Coordinator,
    AcademicOperator,
    /// Silent auditor with no scheduling rights.
    Observer,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Teacher,
        Role::Student,
        Role::Parent,
        Role::Coordinator,
        Role::AcademicOperator,
        Role::Observer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
            Role::Parent => "parent",
            Role::Coordinator => "coordinator",
            Role::AcademicOperator => "academic_operator",
            Role::Observer => "observer",
        }
    }

    /// Roles allowed hidden presence in a room.
    pub fn is_observer_capable(&self) -> bool {
        match self {
            Role::Coordinator | Role::AcademicOperator | Role::Observer => true,
            Role::Teacher | Role::Student | Role::Parent => false,
        }
    }

    /// Roles allowed to schedule, start, end and cancel any class.
    pub fn is_administrative(&self) -> bool {
        match self {
            Role::Coordinator | Role::AcademicOperator => true,
            Role::Teacher | Role::Student | Role::Parent | Role::Observer => false,
        }
    }

    pub fn is_fee_gated(&self) -> bool {
        match self {
            Role::Student | Role::Parent => true,
            Role::Teacher | Role::Coordinator | Role::AcademicOperator | Role::Observer => false,
        }
    }

    /// Whether the role may enter a room that has not gone live yet.
    pub fn may_enter_before_live(&self) -> bool {
        matches!(self, Role::Teacher) || self.is_observer_capable()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ClassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| ClassError::Validation(format!("unknown role '{}'", s)))
    }
}
