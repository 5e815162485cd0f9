mod common;

use std::time::Duration;

use liveclass_api::ticker::Ticker;
use liveclass_core::models::{Actor, LifecycleTarget, NewSession, Role, SessionStatus};
use liveclass_core::ports::SessionStore;
use pretty_assertions::assert_eq;

use common::*;

fn physics(start: &str, duration_minutes: i32) -> NewSession {
    serde_json::from_value(new_session_body(start, duration_minutes)).expect("new session")
}

fn coordinator() -> Actor {
    Actor::person(COORDINATOR, Role::Coordinator)
}

#[tokio::test]
async fn test_tick_starts_due_sessions_and_sends_reminders() {
    let app = TestApp::at("12:00");
    app.seed_batch();
    let session = app
        .engine
        .lifecycle()
        .create_session(physics("14:00", 60), &coordinator())
        .await
        .unwrap();
    app.engine.clock.set(local(DAY, "13:46"));
    let ticker = Ticker::new(app.engine.ctx.clone(), None);

    let report = ticker.tick().await;

    let scan = report.scan.expect("scan report");
    assert_eq!(scan.started(), 1);
    assert_eq!(report.reminders.windows.len(), 3);
    let stored = app.engine.store.get_session(session.session_id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Live);

    let again = ticker.tick().await;
    assert_eq!(again.scan.expect("scan report").candidates, 0);
}

#[tokio::test]
async fn test_sweep_ends_overdue_rooms() {
    let app = TestApp::at("13:50");
    let session = app
        .engine
        .lifecycle()
        .create_session(physics("14:00", 30), &coordinator())
        .await
        .unwrap();
    app.engine
        .lifecycle()
        .go_live(&LifecycleTarget::Session(session.session_id), &coordinator())
        .await
        .unwrap();
    let ticker = Ticker::new(app.engine.ctx.clone(), Some(Duration::from_secs(300)));

    assert_eq!(ticker.sweep().await, 0);
    app.engine.clock.set(local(DAY, "14:31"));
    assert_eq!(ticker.sweep().await, 1);
    assert_eq!(ticker.sweep().await, 0);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_run_loop_polls_and_sweeps_on_its_own_interval() {
    let app = TestApp::at("13:46");
    let session = app
        .engine
        .lifecycle()
        .create_session(physics("14:00", 30), &coordinator())
        .await
        .unwrap();
    let ticker = Ticker::new(app.engine.ctx.clone(), Some(Duration::from_secs(300)));
    let handle = tokio::spawn(ticker.run());

    // First poll fires immediately.
    tokio::time::sleep(Duration::from_secs(1)).await;
    let room = app.engine.store.get_room(&session.video_room_name).await.unwrap().unwrap();
    assert_eq!(room.status, SessionStatus::Live);

    // Class time passes; only the sweep ends the room.
    app.engine.clock.set(local(DAY, "14:31"));
    tokio::time::sleep(Duration::from_secs(120)).await;
    let room = app.engine.store.get_room(&session.video_room_name).await.unwrap().unwrap();
    assert_eq!(room.status, SessionStatus::Live);

    tokio::time::sleep(Duration::from_secs(200)).await;
    let room = app.engine.store.get_room(&session.video_room_name).await.unwrap().unwrap();
    assert_eq!(room.status, SessionStatus::Ended);

    handle.abort();
}
