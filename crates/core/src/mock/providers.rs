use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::{ClassError, ClassResult};
use crate::models::{DispatchReceipt, JoinGrants, LiveParticipant, MintedCredential, Notification};
use crate::ports::{Clock, NotificationDispatcher, VideoProvider};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Credential handed out by [`FakeVideoProvider`], kept for inspection.
#[derive(Debug, Clone)]
pub struct MintRecord {
    pub room: String,
    pub identity: String,
    pub display_name: String,
    pub grants: JoinGrants,
    pub metadata: serde_json::Value,
    pub ttl: Duration,
}

/// Video provider that keeps rooms in memory. `ensure_room` yields before
/// creating so concurrent callers interleave.
#[derive(Default)]
pub struct FakeVideoProvider {
    rooms: Mutex<HashSet<String>>,
    ensure_calls: AtomicUsize,
    participants: Mutex<HashMap<String, Vec<LiveParticipant>>>,
    minted: Mutex<Vec<MintRecord>>,
    fail_listing: Mutex<bool>,
}

impl FakeVideoProvider {
    pub const SERVER_URL: &'static str = "wss://video.test";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_rooms(&self) -> usize {
        guard(&self.rooms).len()
    }

    pub fn ensure_calls(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    pub fn set_participants(&self, room: &str, participants: Vec<LiveParticipant>) {
        guard(&self.participants).insert(room.to_string(), participants);
    }

    pub fn fail_listing(&self, fail: bool) {
        *guard(&self.fail_listing) = fail;
    }

    pub fn minted(&self) -> Vec<MintRecord> {
        guard(&self.minted).clone()
    }
}

#[async_trait]
impl VideoProvider for FakeVideoProvider {
    async fn ensure_room(&self, room: &str, _metadata: &serde_json::Value, _max_participants: i32) -> ClassResult<bool> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(guard(&self.rooms).insert(room.to_string()))
    }

    async fn mint_join_credential(
        &self,
        room: &str,
        identity: &str,
        display_name: &str,
        grants: &JoinGrants,
        metadata: &serde_json::Value,
        ttl: Duration,
    ) -> ClassResult<MintedCredential> {
        guard(&self.minted).push(MintRecord {
            room: room.to_string(),
            identity: identity.to_string(),
            display_name: display_name.to_string(),
            grants: grants.clone(),
            metadata: metadata.clone(),
            ttl,
        });
        Ok(MintedCredential {
            token: format!("fake.{}.{}", room, identity),
            server_url: Self::SERVER_URL.to_string(),
        })
    }

    async fn list_live_participants(&self, room: &str) -> ClassResult<Vec<LiveParticipant>> {
        if *guard(&self.fail_listing) {
            return Err(ClassError::Upstream("participant listing unavailable".into()));
        }
        Ok(guard(&self.participants).get(room).cloned().unwrap_or_default())
    }
}

/// Dispatcher that records every notification. Recipients marked with
/// [`RecordingDispatcher::fail_for`] get an upstream error instead.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<Notification>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, recipient: &str) {
        guard(&self.failing).insert(recipient.to_lowercase());
    }

    pub fn sent(&self) -> Vec<Notification> {
        guard(&self.sent).clone()
    }

    pub fn sent_to(&self, recipient: &str) -> usize {
        guard(&self.sent)
            .iter()
            .filter(|n| n.recipient.eq_ignore_ascii_case(recipient))
            .count()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send(&self, notification: &Notification) -> ClassResult<DispatchReceipt> {
        if guard(&self.failing).contains(&notification.recipient.to_lowercase()) {
            return Err(ClassError::Upstream(format!("dispatch refused {}", notification.recipient)));
        }
        let mut sent = guard(&self.sent);
        sent.push(notification.clone());
        Ok(DispatchReceipt {
            accepted: true,
            external_message_id: Some(format!("msg-{}", sent.len())),
        })
    }
}

/// Clock that only moves when told to.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *guard(&self.now) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = guard(&self.now);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *guard(&self.now)
    }
}
