//! Pending entries: the unit a channel schedules.

use std::fmt;
use tracing::trace;

/// Why an entry was dropped without running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// A newer entry replaced it on a `d`-mode channel.
    Superseded,
    /// It arrived while an `a`-mode channel was busy.
    Ignored,
    /// The manager shut down before granting it.
    Shutdown,
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Superseded => "superseded",
            Self::Ignored => "ignored",
            Self::Shutdown => "shutdown",
        })
    }
}

type RunFn = Box<dyn FnOnce() + Send>;
type DiscardFn = Box<dyn FnOnce(DiscardReason) + Send>;

/// A zero-argument closure the channel invokes when it grants execution.
///
/// An entry ends in exactly one of two ways: [`run`](Self::run) or a
/// discard. The optional discard hook fires for the latter, including
/// when the entry is simply dropped, so whoever created the entry always
/// learns its fate.
///
/// # Example
///
/// ```
/// use ajaxflow_runtime::{DiscardReason, PendingEntry};
/// use std::sync::{Arc, Mutex};
///
/// let fate = Arc::new(Mutex::new(None));
/// let hook = Arc::clone(&fate);
/// let entry = PendingEntry::new(|| {})
///     .on_discard(move |reason| *hook.lock().unwrap() = Some(reason));
///
/// entry.discard(DiscardReason::Superseded);
/// assert_eq!(*fate.lock().unwrap(), Some(DiscardReason::Superseded));
/// ```
pub struct PendingEntry {
    run: Option<RunFn>,
    on_discard: Option<DiscardFn>,
}

impl PendingEntry {
    /// Wraps a closure.
    #[must_use]
    pub fn new<F>(run: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            run: Some(Box::new(run)),
            on_discard: None,
        }
    }

    /// Attaches the discard hook.
    #[must_use]
    pub fn on_discard<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(DiscardReason) + Send + 'static,
    {
        self.on_discard = Some(Box::new(hook));
        self
    }

    /// Invokes the closure. The discard hook is dropped unused.
    pub fn run(mut self) {
        self.on_discard = None;
        if let Some(run) = self.run.take() {
            run();
        }
    }

    /// Drops the closure unrun and fires the discard hook.
    pub fn discard(mut self, reason: DiscardReason) {
        self.fire_discard(reason);
    }

    fn fire_discard(&mut self, reason: DiscardReason) {
        self.run = None;
        if let Some(hook) = self.on_discard.take() {
            trace!(%reason, "Discarding pending entry");
            hook(reason);
        }
    }
}

impl Drop for PendingEntry {
    fn drop(&mut self) {
        if self.run.is_some() {
            self.fire_discard(DiscardReason::Shutdown);
        }
    }
}

impl fmt::Debug for PendingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingEntry")
            .field("runnable", &self.run.is_some())
            .field("has_discard_hook", &self.on_discard.is_some())
            .finish()
    }
}
