//! Named one-shot timers.
//!
//! Setting a timer under an id that is already armed replaces it, so a
//! component that re-renders can safely re-arm its poll timer without
//! leaking the previous one.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

struct Armed {
    generation: u64,
    task: JoinHandle<()>,
}

/// Registry of named one-shot timers.
///
/// Must be used inside a tokio runtime.
#[derive(Default)]
pub struct TimerRegistry {
    timers: Arc<Mutex<HashMap<String, Armed>>>,
    generation: AtomicU64,
}

impl TimerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `func` to run once after `delay`, replacing any timer with the same id.
    pub fn set<F>(&self, id: &str, delay: Duration, func: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let shared = Arc::clone(&self.timers);
        let key = id.to_string();

        // Held across spawn so a zero delay cannot fire before registration.
        let mut timers = self.timers.lock();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut timers = shared.lock();
                match timers.get(&key) {
                    Some(armed) if armed.generation == generation => {
                        timers.remove(&key);
                    }
                    _ => return,
                }
            }
            trace!(timer = %key, "Timer fired");
            func();
        });

        if let Some(previous) = timers.insert(id.to_string(), Armed { generation, task }) {
            debug!(timer = id, "Replacing armed timer");
            previous.task.abort();
        }
    }

    /// Disarms one timer. Returns whether it was armed.
    pub fn clear(&self, id: &str) -> bool {
        match self.timers.lock().remove(id) {
            Some(armed) => {
                armed.task.abort();
                true
            }
            None => false,
        }
    }

    /// Disarms every timer.
    pub fn clear_all(&self) {
        let drained: Vec<Armed> = self.timers.lock().drain().map(|(_, a)| a).collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "Clearing all timers");
        }
        for armed in drained {
            armed.task.abort();
        }
    }

    /// Whether `id` is armed.
    #[must_use]
    pub fn is_set(&self, id: &str) -> bool {
        self.timers.lock().contains_key(id)
    }

    /// Number of armed timers.
    #[must_use]
    pub fn active(&self) -> usize {
        self.timers.lock().len()
    }
}

impl std::fmt::Debug for TimerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerRegistry")
            .field("active", &self.active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let make = move || {
            let h = Arc::clone(&h);
            Box::new(move || {
                h.fetch_add(1, Ordering::SeqCst);
            }) as Box<dyn FnOnce() + Send>
        };
        (hits, make)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let timers = TimerRegistry::new();
        let (hits, make) = counter();
        timers.set("poll", Duration::from_millis(100), make());
        assert!(timers.is_set("poll"));

        sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        sleep(Duration::from_millis(60)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!timers.is_set("poll"));
    }

    #[tokio::test(start_paused = true)]
    async fn same_id_replaces() {
        let timers = TimerRegistry::new();
        let (hits, make) = counter();
        timers.set("poll", Duration::from_millis(100), make());
        timers.set("poll", Duration::from_millis(100), make());
        assert_eq!(timers.active(), 1);

        sleep(Duration::from_millis(150)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_and_clear_all() {
        let timers = TimerRegistry::new();
        let (hits, make) = counter();
        timers.set("a", Duration::from_millis(10), make());
        timers.set("b", Duration::from_millis(10), make());
        timers.set("c", Duration::from_millis(10), make());

        assert!(timers.clear("a"));
        assert!(!timers.clear("a"));
        timers.clear_all();
        assert_eq!(timers.active(), 0);

        sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
