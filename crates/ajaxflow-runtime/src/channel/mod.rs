//! Channels: ordered, at-most-one-active execution of pending entries.
//!
//! # Modes
//!
//! | Mode | While busy, a new entry is... |
//! |------|-------------------------------|
//! | `s` | appended to the FIFO queue |
//! | `d` | kept as the only queued entry; older queued entries are discarded |
//! | `a` | discarded |
//!
//! In every mode the active entry is never interrupted. Only queued
//! entries are superseded.
//!
//! # Components
//!
//! - [`PendingEntry`]: closure plus optional discard hook
//! - [`Channel`]: busy flag and queue for one name
//! - [`ChannelManager`]: name → channel registry with `schedule`/`done`

#[allow(clippy::module_inception)]
mod channel;
mod entry;
mod manager;

pub use channel::{Admission, Channel};
pub use entry::{DiscardReason, PendingEntry};
pub use manager::{ChannelManager, ScheduleOutcome};
