//! In-memory implementations of every port, for tests and local runs
//! without PostgreSQL or an external provider.

mod memory;
mod providers;

use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use memory::{LedgerRow, MemoryLedger, MemoryStore};
pub use providers::{FakeVideoProvider, FixedClock, MintRecord, RecordingDispatcher};

use crate::config::EngineConfig;
use crate::errors::ClassResult;
use crate::services::{
    AutoStartScanner, EngineContext, JoinAuthorizer, LifecycleController, ReminderEngine, TimetableNotifier,
};

/// Engine wired to in-memory ports, with typed handles on each fake.
#[derive(Clone)]
pub struct MockEngine {
    pub store: Arc<MemoryStore>,
    pub ledger: Arc<MemoryLedger>,
    pub video: Arc<FakeVideoProvider>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub clock: Arc<FixedClock>,
    pub ctx: EngineContext,
}

impl MockEngine {
    pub fn new(config: EngineConfig, now: DateTime<Utc>) -> ClassResult<Self> {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MemoryLedger::new());
        let video = Arc::new(FakeVideoProvider::new());
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let clock = Arc::new(FixedClock::new(now));
        let ctx = EngineContext::new(
            store.clone(),
            ledger.clone(),
            video.clone(),
            dispatcher.clone(),
            clock.clone(),
            config,
        )?;
        Ok(Self {
            store,
            ledger,
            video,
            dispatcher,
            clock,
            ctx,
        })
    }

    pub fn lifecycle(&self) -> LifecycleController {
        LifecycleController::new(self.ctx.clone())
    }

    pub fn lifecycle_with_timetable(&self) -> (LifecycleController, TimetableNotifier) {
        let timetable = TimetableNotifier::new(self.ctx.clone());
        (self.lifecycle().with_timetable(timetable.clone()), timetable)
    }

    pub fn scanner(&self) -> AutoStartScanner {
        AutoStartScanner::new(self.ctx.clone(), self.lifecycle())
    }

    pub fn reminders(&self) -> ReminderEngine {
        ReminderEngine::new(self.ctx.clone())
    }

    pub fn join(&self) -> JoinAuthorizer {
        JoinAuthorizer::new(self.ctx.clone())
    }
}
