use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const REMINDER_TEMPLATE: &str = "class_reminder";
pub const TIMETABLE_TEMPLATE: &str = "timetable_updated";

/// One reminder window, e.g. thirty minutes before start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderWindow {
    pub label: String,
    pub minutes_before: i64,
    /// Only sessions that are already live qualify.
    pub requires_live: bool,
}

impl ReminderWindow {
    pub fn new(label: impl Into<String>, minutes_before: i64, requires_live: bool) -> Self {
        Self {
            label: label.into(),
            minutes_before,
            requires_live,
        }
    }

    /// Ledger key for this window of one session. Windows of the same
    /// session never share a key.
    pub fn dedup_key(&self, session_id: Uuid) -> String {
        format!("{}{}", dedup_prefix(session_id), self.label)
    }
}

pub fn dedup_prefix(session_id: Uuid) -> String {
    format!("session:{}:", session_id)
}

/// Idempotency ledger row requested before a send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerClaim {
    pub recipient: String,
    pub template_type: String,
    pub dedup_key: String,
    pub day: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent { external_message_id: Option<String> },
    Failed { error: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderCounts {
    pub sent: i64,
    pub failed: i64,
    /// Claimed but not yet completed.
    pub pending: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Normal,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReceipt {
    pub accepted: bool,
    pub external_message_id: Option<String>,
}
