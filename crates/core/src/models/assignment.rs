use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Role;
use crate::errors::ClassError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Exempt,
    Unpaid,
    Pending,
    Paid,
    Overdue,
    Unknown,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 6] = [
        PaymentStatus::Exempt,
        PaymentStatus::Unpaid,
        PaymentStatus::Pending,
        PaymentStatus::Paid,
        PaymentStatus::Overdue,
        PaymentStatus::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Exempt => "exempt",
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Overdue => "overdue",
            PaymentStatus::Unknown => "unknown",
        }
    }

    pub fn blocks_join(&self) -> bool {
        matches!(self, PaymentStatus::Overdue | PaymentStatus::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ClassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ClassError::Validation(format!("unknown payment status '{}'", s)))
    }
}

/// Links one participant to one room. Unique per (room, participant email).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub room_id: String,
    pub participant_email: String,
    pub participant_name: String,
    pub participant_type: Role,
    pub payment_status: PaymentStatus,
    #[serde(skip_serializing)]
    pub join_token: Option<String>,
    pub token_redeemed_at: Option<DateTime<Utc>>,
    pub joined_at: Option<DateTime<Utc>>,
    pub left_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A person attached to a batch, resolved for fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMember {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub payment_status: PaymentStatus,
}
