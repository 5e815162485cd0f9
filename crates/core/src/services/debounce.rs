//! Per-key trailing-edge debouncer.
//!
//! State is an explicit map owned by whoever holds the debouncer, one entry
//! per key with a pending task. A second `touch` on the same key aborts the
//! pending task and starts a new quiet period. The map lives in this
//! process only; running several API instances needs a shared store.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

struct State<K> {
    next_generation: u64,
    entries: HashMap<K, Pending>,
}

pub struct KeyedDebouncer<K> {
    quiet_period: Duration,
    state: Arc<Mutex<State<K>>>,
}

impl<K> Clone for KeyedDebouncer<K> {
    fn clone(&self) -> Self {
        Self {
            quiet_period: self.quiet_period,
            state: Arc::clone(&self.state),
        }
    }
}

impl<K> KeyedDebouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            state: Arc::new(Mutex::new(State {
                next_generation: 0,
                entries: HashMap::new(),
            })),
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Runs `action` once `key` has been quiet for the full period.
    pub fn touch<F, Fut>(&self, key: K, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = lock(&self.state);
        state.next_generation += 1;
        let generation = state.next_generation;

        let shared = Arc::clone(&self.state);
        let quiet_period = self.quiet_period;
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            {
                let mut state = lock(&shared);
                match state.entries.get(&task_key) {
                    Some(pending) if pending.generation == generation => {
                        state.entries.remove(&task_key);
                    }
                    // Superseded between wake-up and lock.
                    _ => return,
                }
            }
            action().await;
        });

        if let Some(previous) = state.entries.insert(key, Pending { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Drops the pending action for `key`. Returns whether one was pending.
    pub fn cancel(&self, key: &K) -> bool {
        match lock(&self.state).entries.remove(key) {
            Some(pending) => {
                pending.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.state).entries.contains_key(key)
    }

    pub fn pending(&self) -> usize {
        lock(&self.state).entries.len()
    }
}

fn lock<K>(state: &Mutex<State<K>>) -> MutexGuard<'_, State<K>> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
