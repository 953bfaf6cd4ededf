//! Suspend/notify bookkeeping.
//!
//! A call does not release its channel while any suspend lock is
//! outstanding. Each [`Suspender::suspend`] increments the counter and
//! returns a [`Notify`]; the first [`Notify::notify`] on it decrements.
//!
//! ```text
//!  suspend() ──► count=1 ──► suspend() ──► count=2
//!                                              │
//!         notify(b) ◄── count=1 ◄── notify(a) ◄┘
//!             │
//!             ▼
//!          count=0 ──► wait_released() resolves ──► done handlers, channel done
//! ```
//!
//! A `Notify` that is dropped without ever being called leaves its lock
//! held forever. The channel then never releases. This is logged as a
//! warning but not repaired.

use ajaxflow_types::CallId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

/// Per-call suspend counter.
#[derive(Debug, Clone)]
pub struct Suspender {
    call_id: Option<CallId>,
    count: Arc<watch::Sender<usize>>,
}

impl Suspender {
    /// Creates a counter for `call_id` at zero.
    #[must_use]
    pub fn new(call_id: CallId) -> Self {
        Self::with_owner(Some(call_id))
    }

    /// Creates a counter that belongs to no call.
    ///
    /// Used when a response is applied outside a call, e.g. a websocket
    /// push; nothing waits on it.
    #[must_use]
    pub fn detached() -> Self {
        Self::with_owner(None)
    }

    fn with_owner(call_id: Option<CallId>) -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            call_id,
            count: Arc::new(tx),
        }
    }

    /// Acquires a lock.
    #[must_use = "dropping the Notify without calling it keeps the channel busy forever"]
    pub fn suspend(&self) -> Notify {
        let mut now = 0;
        self.count.send_modify(|c| {
            *c += 1;
            now = *c;
        });
        trace!(call = ?self.call_id, outstanding = now, "Call suspended");
        Notify {
            inner: Arc::new(NotifyInner {
                fired: AtomicBool::new(false),
                call_id: self.call_id,
                count: Arc::clone(&self.count),
            }),
        }
    }

    /// Outstanding locks.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        *self.count.borrow()
    }

    /// Resolves once every lock has been notified.
    pub async fn wait_released(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|c| *c == 0).await;
    }
}

/// Releases one suspend lock.
///
/// Cloning shares the same lock; only the first `notify` across all
/// clones counts.
#[derive(Debug, Clone)]
pub struct Notify {
    inner: Arc<NotifyInner>,
}

#[derive(Debug)]
struct NotifyInner {
    fired: AtomicBool,
    call_id: Option<CallId>,
    count: Arc<watch::Sender<usize>>,
}

impl Notify {
    /// Releases the lock. Repeated calls are ignored.
    pub fn notify(&self) {
        if self.inner.fired.swap(true, Ordering::AcqRel) {
            debug!(call = ?self.inner.call_id, "Notify called more than once, ignoring");
            return;
        }
        let mut now = 0;
        self.inner.count.send_modify(|c| {
            *c = c.saturating_sub(1);
            now = *c;
        });
        trace!(call = ?self.inner.call_id, outstanding = now, "Suspend lock released");
    }

    /// Whether this lock has been released.
    #[must_use]
    pub fn is_notified(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }
}

impl Drop for NotifyInner {
    fn drop(&mut self) {
        if !*self.fired.get_mut() {
            warn!(
                call = ?self.call_id,
                "Suspend lock dropped without notify; the channel stays busy"
            );
        }
    }
}
