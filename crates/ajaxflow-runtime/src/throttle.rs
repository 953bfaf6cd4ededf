//! Throttler - coalesces repeated registrations under one token.
//!
//! # Timeline
//!
//! ```text
//! postpone = false (delay anchored to the first registration)
//!
//!   t=0   throttle(k, f1) ──► f1 runs now, timer armed for t=delay
//!   t=3   throttle(k, f2) ──► stored
//!   t=6   throttle(k, f3) ──► replaces f2
//!   t=delay               ──► f3 runs, entry cleared
//!
//! postpone = true (every registration restarts the timer)
//!
//!   t=0   throttle(k, f1) ──► stored, timer armed for t=delay
//!   t=3   throttle(k, f2) ──► replaces f1, timer re-armed for t=3+delay
//!   t=3+delay             ──► f2 runs, entry cleared
//! ```
//!
//! Only the most recently registered closure for a token survives to
//! the timer. Distinct tokens never wait on each other.
//!
//! The timer is a tokio task, so registrations must happen inside a
//! tokio runtime. Without one the closure runs immediately.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

type Task = Box<dyn FnOnce() + Send>;

struct ThrottleEntry {
    func: Option<Task>,
    generation: u64,
    timer: JoinHandle<()>,
    scheduled_at: Instant,
}

type Entries = Arc<Mutex<HashMap<String, ThrottleEntry>>>;

/// Token-keyed coalescing of closures.
///
/// # Example
///
/// ```
/// use ajaxflow_runtime::Throttler;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread", start_paused = true)]
/// # async fn main() {
/// let throttler = Throttler::new(true);
/// let last = Arc::new(AtomicUsize::new(0));
/// for i in 1..=5 {
///     let last = Arc::clone(&last);
///     throttler.throttle("search", Duration::from_millis(100), move || {
///         last.store(i, Ordering::SeqCst);
///     });
/// }
/// tokio::time::sleep(Duration::from_millis(150)).await;
/// assert_eq!(last.load(Ordering::SeqCst), 5);
/// # }
/// ```
pub struct Throttler {
    postpone: bool,
    entries: Entries,
    generation: AtomicU64,
}

impl Throttler {
    /// Creates a throttler.
    ///
    /// With `postpone`, each registration restarts the token's delay.
    #[must_use]
    pub fn new(postpone: bool) -> Self {
        Self {
            postpone,
            entries: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Whether registrations restart the delay.
    #[must_use]
    pub fn postpones(&self) -> bool {
        self.postpone
    }

    /// Registers `func` under `token`.
    pub fn throttle<F>(&self, token: &str, delay: Duration, func: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Ok(handle) = Handle::try_current() else {
            warn!(token, "No async runtime, running throttled function immediately");
            func();
            return;
        };

        let run_now = {
            let mut entries = self.entries.lock();
            match entries.get_mut(token) {
                Some(entry) => {
                    trace!(token, postpone = self.postpone, "Replacing throttled function");
                    entry.func = Some(Box::new(func));
                    if self.postpone {
                        entry.timer.abort();
                        entry.generation = self.next_generation();
                        entry.timer = self.arm(&handle, token, delay, entry.generation);
                        entry.scheduled_at = Instant::now();
                    }
                    None
                }
                None => {
                    let generation = self.next_generation();
                    let timer = self.arm(&handle, token, delay, generation);
                    let (stored, run_now): (Option<Task>, Option<Task>) = if self.postpone {
                        (Some(Box::new(func)), None)
                    } else {
                        (None, Some(Box::new(func)))
                    };
                    entries.insert(
                        token.to_string(),
                        ThrottleEntry {
                            func: stored,
                            generation,
                            timer,
                            scheduled_at: Instant::now(),
                        },
                    );
                    debug!(token, delay_ms = delay.as_millis() as u64, "Throttle window opened");
                    run_now
                }
            }
        };

        if let Some(func) = run_now {
            func();
        }
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn arm(&self, handle: &Handle, token: &str, delay: Duration, generation: u64) -> JoinHandle<()> {
        let entries = Arc::clone(&self.entries);
        let token = token.to_string();
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let func = {
                let mut entries = entries.lock();
                match entries.get(&token) {
                    Some(entry) if entry.generation == generation => {
                        entries.remove(&token).and_then(|e| e.func)
                    }
                    _ => return,
                }
            };
            match func {
                Some(func) => {
                    debug!(token = %token, "Throttle window closed, running latest function");
                    func();
                }
                None => trace!(token = %token, "Throttle window closed, nothing pending"),
            }
        })
    }

    /// Whether `token` has an open window.
    #[must_use]
    pub fn is_pending(&self, token: &str) -> bool {
        self.entries.lock().contains_key(token)
    }

    /// Number of open windows.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// When the token's current timer was armed.
    #[must_use]
    pub fn scheduled_at(&self, token: &str) -> Option<Instant> {
        self.entries.lock().get(token).map(|e| e.scheduled_at)
    }

    /// Closes a window without running its stored function.
    pub fn cancel(&self, token: &str) -> bool {
        match self.entries.lock().remove(token) {
            Some(entry) => {
                entry.timer.abort();
                true
            }
            None => false,
        }
    }

    /// Closes every window.
    pub fn cancel_all(&self) {
        let drained: Vec<ThrottleEntry> = self.entries.lock().drain().map(|(_, e)| e).collect();
        for entry in drained {
            entry.timer.abort();
        }
    }
}

impl std::fmt::Debug for Throttler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttler")
            .field("postpone", &self.postpone)
            .field("pending", &self.pending_count())
            .finish()
    }
}
