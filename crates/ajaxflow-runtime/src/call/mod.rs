//! The call lifecycle.
//!
//! A call is created from [`CallAttributes`] plus optional native
//! [`CallHooks`], checked against its preconditions, scheduled on its
//! channel and, once granted, executed as a tokio task. Its
//! [`CallHandle`] resolves to a [`CallOutcome`] on every path,
//! including cancellation and supersession.
//!
//! # States
//!
//! ```text
//! Created ──► Cancelled                      (precondition false)
//!    │
//!    ▼
//! Pending ──► Superseded | Ignored | Aborted (discarded by channel or shutdown)
//!    │
//!    ▼
//! InFlight ──► Completed | Failed ──► (suspend locks) ──► channel released
//! ```

mod attributes;
mod error;
mod hooks;
mod lifecycle;
mod suspend;

pub use attributes::{AttributeError, CallAttributes, HttpMethod, Parameter, ThrottleSettings};
pub use error::{CallError, CallOutcome};
pub use hooks::{CallContext, CallHooks};
pub use lifecycle::CallHandle;
pub use suspend::{Notify, Suspender};

pub(crate) use lifecycle::launch;
