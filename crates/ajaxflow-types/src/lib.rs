//! Core types for ajaxflow.
//!
//! This crate holds the vocabulary shared by every other ajaxflow crate:
//! identifiers, the channel naming scheme and the error-code contract.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Vocabulary Layer                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ajaxflow-types   : CallId, ChannelSpec, ErrorCode  ◄── HERE │
//! │  ajaxflow-event   : Topic, Notification                     │
//! │  ajaxflow-dom     : Document, markup parser, DomPatch       │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Runtime Layer                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ajaxflow-runtime : throttler, channels, calls, responses   │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Frontend Layer                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ajaxflow-cli     : apply / fetch from the command line     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Channel Naming
//!
//! Calls are serialized per named channel. A channel is written as a
//! single token `"name|mode"`:
//!
//! | Mode | Meaning |
//! |------|---------|
//! | `s` | Sequential: busy channel queues new entries FIFO |
//! | `d` | Drop: busy channel keeps only the newest queued entry |
//! | `a` | Active: busy channel ignores new entries |
//!
//! # Example
//!
//! ```
//! use ajaxflow_types::{CallId, ChannelMode, ChannelSpec};
//!
//! let spec = ChannelSpec::parse("poll|d").unwrap();
//! assert_eq!(spec.name(), "poll");
//! assert_eq!(spec.mode(), ChannelMode::Drop);
//!
//! // Anything that is not "name|mode" is the default channel.
//! assert_eq!(ChannelSpec::parse_lenient("garbage"), ChannelSpec::default());
//!
//! let a = CallId::new();
//! let b = CallId::new();
//! assert_ne!(a, b);
//! ```

mod channel;
mod error;
mod id;

pub use channel::{ChannelMode, ChannelSpec, ChannelSpecError, DEFAULT_CHANNEL};
pub use error::{assert_error_code, assert_error_codes, assert_unique_error_codes, ErrorCode};
pub use id::{CallId, SubscriptionId};
