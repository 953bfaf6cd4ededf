//! Native call hooks.
//!
//! Attribute objects carry handler *scripts*; [`CallHooks`] carries
//! native Rust closures for the same lifecycle points. Both run: hooks
//! first, then scripts.
//!
//! | Hook | Runs | Receives |
//! |------|------|----------|
//! | `precondition` | at creation, before scheduling | context |
//! | `dependency` | at fire time, while building the request | context |
//! | `url_builder` | at fire time | context |
//! | `before` | when the channel grants the call | context |
//! | `on_success` | after a 2xx response was handled | context, response |
//! | `on_failure` | after any failure | context, error |
//! | `on_complete` | after success or failure | context |
//! | `on_done` | after suspend locks are released | context |

use super::{CallAttributes, CallError, Notify, Parameter, Suspender};
use crate::script::ScriptContext;
use crate::transport::AjaxResponse;
use ajaxflow_dom::SharedDocument;
use ajaxflow_event::CallSummary;
use ajaxflow_types::CallId;
use std::fmt;
use std::sync::Arc;

/// View of a call handed to hooks.
#[derive(Clone, Copy)]
pub struct CallContext<'a> {
    pub(crate) summary: &'a CallSummary,
    pub(crate) attributes: &'a CallAttributes,
    pub(crate) document: &'a SharedDocument,
    pub(crate) suspender: &'a Suspender,
}

impl<'a> CallContext<'a> {
    /// The call's id.
    #[must_use]
    pub fn call_id(&self) -> CallId {
        self.summary.call_id
    }

    /// Normalized attributes.
    #[must_use]
    pub fn attributes(&self) -> &'a CallAttributes {
        self.attributes
    }

    /// The live document. Lock it only for the duration of a read or
    /// patch.
    #[must_use]
    pub fn document(&self) -> &'a SharedDocument {
        self.document
    }

    /// Identity as published on the bus.
    #[must_use]
    pub fn summary(&self) -> &'a CallSummary {
        self.summary
    }

    /// Holds the channel until the returned [`Notify`] is called.
    #[must_use = "dropping the Notify without calling it keeps the channel busy forever"]
    pub fn suspend(&self) -> Notify {
        self.suspender.suspend()
    }

    /// The same view for a script host.
    #[must_use]
    pub fn script_context(&self) -> ScriptContext<'a> {
        ScriptContext {
            call: Some(self.summary),
            document: self.document,
            suspender: Some(self.suspender),
        }
    }
}

impl fmt::Debug for CallContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("call_id", &self.summary.call_id)
            .field("url", &self.summary.url)
            .finish_non_exhaustive()
    }
}

pub(crate) type PredicateFn = Arc<dyn Fn(&CallContext<'_>) -> bool + Send + Sync>;
pub(crate) type DependencyFn = Arc<dyn Fn(&CallContext<'_>) -> Vec<Parameter> + Send + Sync>;
pub(crate) type UrlFn = Arc<dyn Fn(&CallContext<'_>) -> String + Send + Sync>;
pub(crate) type StageFn = Arc<dyn Fn(&CallContext<'_>) + Send + Sync>;
pub(crate) type SuccessFn = Arc<dyn Fn(&CallContext<'_>, &AjaxResponse) + Send + Sync>;
pub(crate) type FailureFn = Arc<dyn Fn(&CallContext<'_>, &CallError) + Send + Sync>;

/// Native closures attached to one call.
///
/// # Example
///
/// ```
/// use ajaxflow_runtime::{CallHooks, Parameter};
///
/// let hooks = CallHooks::new()
///     .precondition(|ctx| ctx.attributes().component_id.is_some())
///     .dependency(|_| vec![Parameter::new("page", "2")])
///     .on_complete(|ctx| println!("call {} complete", ctx.call_id()));
/// assert!(!hooks.has_url_builder());
/// ```
#[derive(Clone, Default)]
pub struct CallHooks {
    pub(crate) preconditions: Vec<PredicateFn>,
    pub(crate) dependencies: Vec<DependencyFn>,
    pub(crate) url_builder: Option<UrlFn>,
    pub(crate) before: Vec<StageFn>,
    pub(crate) success: Vec<SuccessFn>,
    pub(crate) failure: Vec<FailureFn>,
    pub(crate) complete: Vec<StageFn>,
    pub(crate) done: Vec<StageFn>,
}

impl CallHooks {
    /// No hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a predicate; every predicate must return `true`.
    #[must_use]
    pub fn precondition<F>(mut self, f: F) -> Self
    where
        F: Fn(&CallContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.preconditions.push(Arc::new(f));
        self
    }

    /// Adds a provider of extra parameters, asked at fire time.
    #[must_use]
    pub fn dependency<F>(mut self, f: F) -> Self
    where
        F: Fn(&CallContext<'_>) -> Vec<Parameter> + Send + Sync + 'static,
    {
        self.dependencies.push(Arc::new(f));
        self
    }

    /// Computes the URL at fire time instead of using the declared one.
    #[must_use]
    pub fn url_builder<F>(mut self, f: F) -> Self
    where
        F: Fn(&CallContext<'_>) -> String + Send + Sync + 'static,
    {
        self.url_builder = Some(Arc::new(f));
        self
    }

    /// Whether a URL builder is set.
    #[must_use]
    pub fn has_url_builder(&self) -> bool {
        self.url_builder.is_some()
    }

    /// Runs when the channel grants the call.
    #[must_use]
    pub fn before<F>(mut self, f: F) -> Self
    where
        F: Fn(&CallContext<'_>) + Send + Sync + 'static,
    {
        self.before.push(Arc::new(f));
        self
    }

    /// Runs after a 2xx response was handled.
    #[must_use]
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(&CallContext<'_>, &AjaxResponse) + Send + Sync + 'static,
    {
        self.success.push(Arc::new(f));
        self
    }

    /// Runs after a failure.
    #[must_use]
    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(&CallContext<'_>, &CallError) + Send + Sync + 'static,
    {
        self.failure.push(Arc::new(f));
        self
    }

    /// Runs after success or failure.
    #[must_use]
    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: Fn(&CallContext<'_>) + Send + Sync + 'static,
    {
        self.complete.push(Arc::new(f));
        self
    }

    /// Runs once every suspend lock is released, right before the
    /// channel is freed.
    #[must_use]
    pub fn on_done<F>(mut self, f: F) -> Self
    where
        F: Fn(&CallContext<'_>) + Send + Sync + 'static,
    {
        self.done.push(Arc::new(f));
        self
    }
}

impl fmt::Debug for CallHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallHooks")
            .field("preconditions", &self.preconditions.len())
            .field("dependencies", &self.dependencies.len())
            .field("url_builder", &self.url_builder.is_some())
            .field("before", &self.before.len())
            .field("success", &self.success.len())
            .field("failure", &self.failure.len())
            .field("complete", &self.complete.len())
            .field("done", &self.done.len())
            .finish()
    }
}
