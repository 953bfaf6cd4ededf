//! ChannelManager - registry of named channels.
//!
//! # Flow
//!
//! ```text
//! schedule("poll|d", entry)
//!        │
//!        ▼
//!  ┌────────────┐  lock   ┌─────────────────┐
//!  │ get-or-    │ ──────► │ Channel::admit  │ ──► Admission
//!  │ create     │         └─────────────────┘        │
//!  └────────────┘  unlock ◄──────────────────────────┘
//!        │
//!        ▼
//!  run / discard entries (lock released)
//! ```
//!
//! Entries are only ever invoked or discarded with the registry lock
//! released, so an entry may call [`ChannelManager::schedule`] or
//! [`ChannelManager::done`] on the same manager before returning.
//!
//! A channel is removed from the registry as soon as it goes idle and
//! is recreated on demand. Grants come from one counter per manager, so
//! they stay unique across a channel's removal and recreation.

use super::channel::{Admission, Channel};
use super::entry::{DiscardReason, PendingEntry};
use ajaxflow_types::ChannelSpec;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, warn};

/// What [`ChannelManager::schedule`] did with an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// The channel was idle; the entry ran synchronously.
    Started,
    /// Queued behind the active entry (`s` mode). 1-based position.
    Queued {
        /// Position in the queue.
        position: usize,
    },
    /// Became the single pending entry (`d` mode), superseding others.
    Replaced {
        /// How many queued entries were discarded.
        superseded: usize,
    },
    /// Discarded because the channel was busy (`a` mode).
    Ignored,
}

/// Routes `schedule`/`done` to named channels.
///
/// # Example
///
/// ```
/// use ajaxflow_runtime::{ChannelManager, PendingEntry, ScheduleOutcome};
/// use ajaxflow_types::ChannelSpec;
///
/// let manager = ChannelManager::new();
/// let spec = ChannelSpec::parse("0|s").unwrap();
///
/// assert_eq!(manager.schedule(&spec, PendingEntry::new(|| {})), ScheduleOutcome::Started);
/// assert_eq!(
///     manager.schedule(&spec, PendingEntry::new(|| {})),
///     ScheduleOutcome::Queued { position: 1 }
/// );
///
/// manager.done(&spec); // runs the queued entry
/// manager.done(&spec); // channel goes idle
/// assert!(!manager.is_busy("0"));
/// ```
#[derive(Debug, Default)]
pub struct ChannelManager {
    channels: Mutex<HashMap<String, Channel>>,
    grants: AtomicU64,
}

impl ChannelManager {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers `entry` to the channel named by `spec`.
    ///
    /// The channel adopts `spec`'s mode, so a later schedule with a
    /// different mode changes how the channel treats new entries.
    pub fn schedule(&self, spec: &ChannelSpec, entry: PendingEntry) -> ScheduleOutcome {
        let grant = self.next_grant();
        let admission = {
            let mut channels = self.channels.lock();
            let channel = channels
                .entry(spec.name().to_string())
                .or_insert_with(|| Channel::new(spec.name(), spec.mode()));
            if channel.mode() != spec.mode() {
                debug!(
                    channel = spec.name(),
                    from = %channel.mode(),
                    to = %spec.mode(),
                    "Channel mode changed"
                );
                channel.set_mode(spec.mode());
            }
            channel.admit(entry, grant)
        };

        match admission {
            Admission::Run(entry) => {
                debug!(channel = %spec, "Channel idle, running entry");
                self.invoke(spec, entry, grant);
                ScheduleOutcome::Started
            }
            Admission::Queued { position } => {
                debug!(channel = %spec, position, "Channel busy, entry queued");
                ScheduleOutcome::Queued { position }
            }
            Admission::Replaced { discarded } => {
                let superseded = discarded.len();
                if superseded > 0 {
                    info!(channel = %spec, superseded, "Dropping superseded entries");
                }
                for old in discarded {
                    old.discard(DiscardReason::Superseded);
                }
                ScheduleOutcome::Replaced { superseded }
            }
            Admission::Ignored(entry) => {
                info!(channel = %spec, "Channel busy, entry ignored");
                entry.discard(DiscardReason::Ignored);
                ScheduleOutcome::Ignored
            }
        }
    }

    /// Releases the channel's active slot and runs the next entry, if any.
    ///
    /// Callers must call this exactly once per started entry.
    pub fn done(&self, spec: &ChannelSpec) {
        self.release(spec, None);
    }

    /// Releases the slot. With `owner` set, only while that grant holds it.
    fn release(&self, spec: &ChannelSpec, owner: Option<u64>) {
        let grant = self.next_grant();
        let next = {
            let mut channels = self.channels.lock();
            let Some(channel) = channels.get_mut(spec.name()) else {
                if owner.is_none() {
                    warn!(channel = %spec, "done() for an unknown channel");
                }
                return;
            };
            if owner.is_some() && channel.active_grant() != owner {
                debug!(channel = %spec, "Slot already released by its entry");
                return;
            }
            let next = channel.release(grant);
            if next.is_none() {
                channels.remove(spec.name());
            }
            next
        };

        if let Some(entry) = next {
            debug!(channel = %spec, "Running next queued entry");
            self.invoke(spec, entry, grant);
        } else {
            debug!(channel = %spec, "Channel idle");
        }
    }

    /// Runs an entry, releasing the channel if it panics while still
    /// holding `grant`.
    fn invoke(&self, spec: &ChannelSpec, entry: PendingEntry, grant: u64) {
        if catch_unwind(AssertUnwindSafe(|| entry.run())).is_err() {
            error!(channel = %spec, "Pending entry panicked, releasing channel");
            self.release(spec, Some(grant));
        }
    }

    fn next_grant(&self) -> u64 {
        self.grants.fetch_add(1, Ordering::Relaxed)
    }

    /// Whether the named channel has an active entry.
    #[must_use]
    pub fn is_busy(&self, name: &str) -> bool {
        self.channels.lock().get(name).is_some_and(Channel::is_busy)
    }

    /// Number of entries waiting on the named channel.
    #[must_use]
    pub fn queued(&self, name: &str) -> usize {
        self.channels.lock().get(name).map_or(0, Channel::queued)
    }

    /// Number of channels currently registered (busy ones).
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }

    /// Discards every queued entry and forgets all channels.
    ///
    /// Active entries keep running; their later `done` is a warning.
    pub fn shutdown(&self) {
        let drained: Vec<PendingEntry> = {
            let mut channels = self.channels.lock();
            let drained = channels.values_mut().flat_map(Channel::drain).collect();
            channels.clear();
            drained
        };
        if !drained.is_empty() {
            info!(discarded = drained.len(), "Channel manager shut down");
        }
        for entry in drained {
            entry.discard(DiscardReason::Shutdown);
        }
    }
}
