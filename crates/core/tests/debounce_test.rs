use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use liveclass_core::services::KeyedDebouncer;
use pretty_assertions::assert_eq;

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn bump(count: &Arc<AtomicUsize>) -> impl FnOnce() -> std::future::Ready<()> + Send + 'static {
    let count = Arc::clone(count);
    move || {
        count.fetch_add(1, Ordering::SeqCst);
        std::future::ready(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_touches_within_quiet_period_fire_once() {
    let debouncer = KeyedDebouncer::new(Duration::from_secs(60));
    let fired = counter();

    debouncer.touch("batch-a", bump(&fired));
    tokio::time::sleep(Duration::from_secs(45)).await;
    debouncer.touch("batch-a", bump(&fired));
    tokio::time::sleep(Duration::from_secs(45)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(debouncer.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_keys_are_independent() {
    let debouncer = KeyedDebouncer::new(Duration::from_secs(10));
    let fired = counter();

    debouncer.touch(1u32, bump(&fired));
    debouncer.touch(2u32, bump(&fired));
    assert_eq!(debouncer.pending(), 2);

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_drops_pending_action() {
    let debouncer = KeyedDebouncer::new(Duration::from_secs(10));
    let fired = counter();

    debouncer.touch("k", bump(&fired));
    assert!(debouncer.is_pending(&"k"));
    assert!(debouncer.cancel(&"k"));
    assert!(!debouncer.cancel(&"k"));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}
