//! In-process replacement for the external cron.
//!
//! Each poll tick runs the auto-start scan and then the reminder windows.
//! The overdue sweep runs on its own interval. Every step relies on the
//! engine's idempotency, so the ticker can run next to an external cron or
//! a second server instance.

use std::future;
use std::time::Duration;

use liveclass_core::services::{
    AutoStartScanner, EngineContext, LifecycleController, ReminderEngine, ReminderReport, ScanReport,
    TimetableNotifier,
};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{error, info, info_span, Instrument};

/// What one poll tick did.
#[derive(Debug, Clone)]
pub struct TickReport {
    /// `None` when the scan failed as a whole.
    pub scan: Option<ScanReport>,
    pub reminders: ReminderReport,
}

#[derive(Clone)]
pub struct Ticker {
    lifecycle: LifecycleController,
    scanner: AutoStartScanner,
    reminders: ReminderEngine,
    poll_interval: Duration,
    sweep_interval: Option<Duration>,
}

impl Ticker {
    pub fn new(engine: EngineContext, sweep_interval: Option<Duration>) -> Self {
        let lifecycle =
            LifecycleController::new(engine.clone()).with_timetable(TimetableNotifier::new(engine.clone()));
        Self {
            scanner: AutoStartScanner::new(engine.clone(), lifecycle.clone()),
            reminders: ReminderEngine::new(engine.clone()),
            poll_interval: engine.config.poll_interval,
            lifecycle,
            sweep_interval,
        }
    }

    pub async fn tick(&self) -> TickReport {
        let scan = match self.scanner.scan().await {
            Ok(report) => {
                if report.candidates > 0 {
                    info!(
                        candidates = report.candidates,
                        started = report.started(),
                        failed = report.failed(),
                        "Auto-start scan finished"
                    );
                }
                Some(report)
            }
            Err(e) => {
                error!(error = %e, "Auto-start scan failed");
                None
            }
        };

        let reminders = self.reminders.run().await;
        if reminders.sent() > 0 || reminders.failed() > 0 {
            info!(sent = reminders.sent(), failed = reminders.failed(), "Reminder run finished");
        }

        TickReport { scan, reminders }
    }

    /// Returns how many overdue classes were ended, 0 on failure.
    pub async fn sweep(&self) -> usize {
        match self.lifecycle.sweep_overdue().await {
            Ok(ended) => ended,
            Err(e) => {
                error!(error = %e, "Overdue sweep failed");
                0
            }
        }
    }

    /// Runs until the task is dropped.
    pub async fn run(self) {
        info!(
            poll_seconds = self.poll_interval.as_secs(),
            sweep_seconds = self.sweep_interval.map(|d| d.as_secs()),
            "Ticker started"
        );

        let mut poll = interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sweep = self.sweep_interval.map(|period| {
            let mut sweep = interval(period);
            sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
            sweep
        });

        let mut tick_number: u64 = 0;
        loop {
            tokio::select! {
                _ = poll.tick() => {
                    tick_number += 1;
                    self.tick().instrument(info_span!("tick", number = tick_number)).await;
                }
                _ = next_sweep(&mut sweep) => {
                    self.sweep().instrument(info_span!("sweep")).await;
                }
            }
        }
    }
}

async fn next_sweep(sweep: &mut Option<Interval>) {
    match sweep {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}
