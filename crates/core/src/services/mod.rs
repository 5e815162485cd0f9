//! Engine services. Each one is a cheap-to-clone handle over the shared
//! [`EngineContext`]; none of them keeps request state between calls.

pub mod auto_start;
pub mod debounce;
pub mod join;
pub mod lifecycle;
pub mod reminders;
pub mod timetable;

use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};

use crate::config::EngineConfig;
use crate::errors::{ClassError, ClassResult};
use crate::ports::{Clock, NotificationDispatcher, NotificationLedger, SessionStore, VideoProvider};

pub use auto_start::{AutoStartScanner, ScanOutcome, ScanReport};
pub use debounce::KeyedDebouncer;
pub use join::JoinAuthorizer;
pub use lifecycle::{LifecycleController, Transition, TransitionOutcome};
pub use reminders::{ReminderEngine, ReminderReport, WindowReport};
pub use timetable::TimetableNotifier;

/// Dependencies shared by every engine service.
#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<dyn SessionStore>,
    pub ledger: Arc<dyn NotificationLedger>,
    pub video: Arc<dyn VideoProvider>,
    pub dispatcher: Arc<dyn NotificationDispatcher>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<EngineConfig>,
    /// Caps concurrent calls to the video provider and dispatch service.
    limiter: Arc<Semaphore>,
}

impl EngineContext {
    pub fn new(
        store: Arc<dyn SessionStore>,
        ledger: Arc<dyn NotificationLedger>,
        video: Arc<dyn VideoProvider>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> ClassResult<Self> {
        config.validate()?;
        let limiter = Arc::new(Semaphore::new(config.concurrency));
        Ok(Self {
            store,
            ledger,
            video,
            dispatcher,
            clock,
            config: Arc::new(config),
            limiter,
        })
    }

    /// Waits for a slot to call an external service.
    pub(crate) async fn external_slot(&self) -> ClassResult<SemaphorePermit<'_>> {
        self.limiter
            .acquire()
            .await
            .map_err(|_| ClassError::Internal("external call limiter closed".into()))
    }
}

/// Room metadata handed to the video provider.
pub(crate) fn room_metadata(room: &crate::models::Room) -> serde_json::Value {
    serde_json::json!({
        "room_name": room.room_name,
        "subject": room.subject,
        "teacher_email": room.teacher_email,
        "scheduled_start": room.scheduled_start,
        "duration_minutes": room.duration_minutes,
        "session_id": room.session_id,
    })
}
