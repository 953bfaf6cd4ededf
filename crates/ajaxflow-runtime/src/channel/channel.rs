//! A single named channel.
//!
//! # State Machine
//!
//! ```text
//!            admit (idle)
//!   ┌──────┐ ───────────► ┌──────┐ ◄─┐ admit (busy): queue / replace / ignore
//!   │ Idle │              │ Busy │ ──┘
//!   └──────┘ ◄─────────── └──────┘ ◄─┐ release (queue non-empty):
//!            release                 │ pop head, stay busy
//!            (queue empty)   ────────┘
//! ```
//!
//! Every activation carries a grant number chosen by the caller, so a
//! late release from an entry that no longer owns the slot can be told
//! apart from the current one.
//!
//! The channel never invokes entries itself. [`Channel::admit`] and
//! [`Channel::release`] hand entries back to the caller, which runs
//! them after letting go of any lock. That keeps `schedule`/`done`
//! re-entrant.

use super::entry::PendingEntry;
use ajaxflow_types::ChannelMode;
use std::collections::VecDeque;
use tracing::warn;

/// Result of offering an entry to a channel.
#[derive(Debug)]
pub enum Admission {
    /// The channel was idle and is now busy; run this entry now.
    Run(PendingEntry),
    /// Appended to the queue (`s` mode). Position is 1-based.
    Queued {
        /// Position in the queue after insertion.
        position: usize,
    },
    /// Queued after dropping every earlier queued entry (`d` mode).
    Replaced {
        /// Entries that must be discarded as superseded.
        discarded: Vec<PendingEntry>,
    },
    /// Refused because the channel is busy (`a` mode).
    Ignored(PendingEntry),
}

/// One named channel: the active grant plus a queue.
#[derive(Debug)]
pub struct Channel {
    name: String,
    mode: ChannelMode,
    active: Option<u64>,
    queue: VecDeque<PendingEntry>,
}

impl Channel {
    /// Creates an idle channel.
    #[must_use]
    pub fn new(name: impl Into<String>, mode: ChannelMode) -> Self {
        Self {
            name: name.into(),
            mode,
            active: None,
            queue: VecDeque::new(),
        }
    }

    /// Channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current mode.
    #[must_use]
    pub fn mode(&self) -> ChannelMode {
        self.mode
    }

    /// Changes the mode applied to future admissions.
    pub fn set_mode(&mut self, mode: ChannelMode) {
        self.mode = mode;
    }

    /// Whether an entry is currently executing.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// Grant of the entry currently holding the slot.
    #[must_use]
    pub fn active_grant(&self) -> Option<u64> {
        self.active
    }

    /// Number of entries waiting.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Offers an entry, which holds `grant` if it runs now.
    pub fn admit(&mut self, entry: PendingEntry, grant: u64) -> Admission {
        if self.active.is_none() {
            self.active = Some(grant);
            return Admission::Run(entry);
        }
        match self.mode {
            ChannelMode::Sequential => {
                self.queue.push_back(entry);
                Admission::Queued {
                    position: self.queue.len(),
                }
            }
            ChannelMode::Drop => {
                let discarded = self.queue.drain(..).collect();
                self.queue.push_back(entry);
                Admission::Replaced { discarded }
            }
            ChannelMode::Active => Admission::Ignored(entry),
        }
    }

    /// Marks the active entry finished.
    ///
    /// Returns the next entry to run, now holding `next_grant`, or
    /// `None` after marking the channel idle.
    pub fn release(&mut self, next_grant: u64) -> Option<PendingEntry> {
        if self.active.is_none() {
            warn!(channel = %self.name, "Release of an idle channel");
        }
        let next = self.queue.pop_front();
        self.active = next.as_ref().map(|_| next_grant);
        next
    }

    /// Takes every queued entry and marks the channel idle.
    pub fn drain(&mut self) -> Vec<PendingEntry> {
        self.active = None;
        self.queue.drain(..).collect()
    }
}
