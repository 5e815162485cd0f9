use std::time::Duration;

use chrono_tz::Tz;

use crate::errors::{ClassError, ClassResult};
use crate::identity;
use crate::models::ReminderWindow;
use crate::windows::{DEFAULT_EARLY_JOIN_MINUTES, DEFAULT_GRACE_MINUTES};

/// Tunables shared by every engine service.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Civil timezone sessions are scheduled in.
    pub timezone: Tz,
    pub early_join_minutes: i64,
    pub grace_minutes: i64,
    pub reminder_windows: Vec<ReminderWindow>,
    /// Half width of the band each reminder window selects on one poll.
    pub reminder_band: Duration,
    /// Expected interval of the periodic trigger.
    pub poll_interval: Duration,
    /// Upper bound on concurrent provider and dispatch calls in one scan.
    pub concurrency: usize,
    /// Age after which an unfinished ledger claim may be taken over.
    pub stale_claim_after: Duration,
    pub join_credential_ttl: Duration,
    pub timetable_quiet_period: Duration,
    /// Base URL used to build invite links in notifications.
    pub portal_base_url: String,
    /// Secret mixed into hidden observer identities.
    pub identity_key: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Asia::Kolkata,
            early_join_minutes: DEFAULT_EARLY_JOIN_MINUTES,
            grace_minutes: DEFAULT_GRACE_MINUTES,
            reminder_windows: default_reminder_windows(),
            reminder_band: Duration::from_secs(90),
            poll_interval: Duration::from_secs(60),
            concurrency: 8,
            stale_claim_after: Duration::from_secs(10 * 60),
            join_credential_ttl: Duration::from_secs(4 * 60 * 60),
            timetable_quiet_period: Duration::from_secs(120),
            portal_base_url: "http://localhost:3000".to_string(),
            identity_key: identity::random_token(32),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> ClassResult<()> {
        if self.early_join_minutes <= 0 {
            return Err(ClassError::Validation("early join minutes must be positive".into()));
        }
        if self.grace_minutes < 0 {
            return Err(ClassError::Validation("grace minutes cannot be negative".into()));
        }
        if self.identity_key.is_empty() {
            return Err(ClassError::Validation("identity key cannot be empty".into()));
        }
        if self.concurrency == 0 {
            return Err(ClassError::Validation("concurrency must be at least 1".into()));
        }
        // A band narrower than half a tick can be stepped over entirely.
        if self.reminder_band <= self.poll_interval / 2 {
            return Err(ClassError::Validation(format!(
                "reminder band of {:?} must exceed half the poll interval ({:?})",
                self.reminder_band, self.poll_interval
            )));
        }
        let mut labels: Vec<&str> = self.reminder_windows.iter().map(|w| w.label.as_str()).collect();
        labels.sort_unstable();
        labels.dedup();
        if labels.len() != self.reminder_windows.len() {
            return Err(ClassError::Validation("reminder window labels must be unique".into()));
        }
        Ok(())
    }
}

pub fn default_reminder_windows() -> Vec<ReminderWindow> {
    vec![
        ReminderWindow::new("30", 30, false),
        ReminderWindow::new("15", 15, false),
        ReminderWindow::new("start", 0, true),
    ]
}

/// Parses `label:minutes[:live]` entries separated by commas,
/// e.g. `30:30,15:15,start:0:live`.
pub fn parse_reminder_windows(spec: &str) -> ClassResult<Vec<ReminderWindow>> {
    spec.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            let (label, minutes, requires_live) = match parts.as_slice() {
                [label, minutes] => (*label, *minutes, false),
                [label, minutes, "live"] => (*label, *minutes, true),
                _ => {
                    return Err(ClassError::Validation(format!(
                        "invalid reminder window '{}'",
                        entry
                    )));
                }
            };
            if label.is_empty() {
                return Err(ClassError::Validation(format!("reminder window '{}' has no label", entry)));
            }
            let minutes_before = minutes.parse::<i64>().map_err(|_| {
                ClassError::Validation(format!("invalid minutes in reminder window '{}'", entry))
            })?;
            if minutes_before < 0 {
                return Err(ClassError::Validation(format!(
                    "reminder window '{}' cannot fire after start",
                    entry
                )));
            }
            Ok(ReminderWindow::new(label, minutes_before, requires_live))
        })
        .collect()
}
