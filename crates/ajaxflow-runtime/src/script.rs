//! Script evaluation seam.
//!
//! The runtime never interprets script text itself. `evaluate`
//! directives, inline head scripts, script-form handlers and script
//! predicates are all handed to a [`ScriptHost`]. Embedders plug in an
//! engine; the CLI and tests use [`NoopScriptHost`] or the recording
//! host in [`crate::testing`].

use crate::call::{Notify, Suspender};
use crate::Parameter;
use ajaxflow_dom::SharedDocument;
use ajaxflow_event::CallSummary;
use ajaxflow_types::ErrorCode;
use thiserror::Error;
use tracing::{debug, info};

/// Script evaluation failure.
///
/// # Error Codes
///
/// | Variant | Code | Recoverable |
/// |---------|------|-------------|
/// | [`ScriptError::Failed`] | `SCRIPT_FAILED` | No |
/// | [`ScriptError::Unsupported`] | `SCRIPT_UNSUPPORTED` | No |
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// The script raised an error.
    #[error("script failed: {message}")]
    Failed {
        /// Engine-provided description.
        message: String,
    },
    /// The host cannot evaluate this kind of script.
    #[error("script evaluation unsupported: {0}")]
    Unsupported(String),
}

impl ScriptError {
    /// Creates a failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

impl ErrorCode for ScriptError {
    fn code(&self) -> &'static str {
        match self {
            Self::Failed { .. } => "SCRIPT_FAILED",
            Self::Unsupported(_) => "SCRIPT_UNSUPPORTED",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// What a script sees while it runs.
#[derive(Clone, Copy)]
pub struct ScriptContext<'a> {
    /// The call whose response is being applied, if any.
    pub call: Option<&'a CallSummary>,
    /// The live document.
    pub document: &'a SharedDocument,
    /// Suspend counter of the call, if any.
    pub suspender: Option<&'a Suspender>,
}

impl<'a> ScriptContext<'a> {
    /// Context outside any call.
    #[must_use]
    pub fn detached(document: &'a SharedDocument) -> Self {
        Self {
            call: None,
            document,
            suspender: None,
        }
    }
}

/// Evaluates script text on behalf of the runtime.
///
/// Hosts must not hold the document lock across a call back into the
/// runtime.
pub trait ScriptHost: Send + Sync {
    /// Evaluates `script` in global scope.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError`] when the script fails. The runtime logs it
    /// and keeps applying the response.
    fn evaluate(&self, script: &str, ctx: &ScriptContext<'_>) -> Result<(), ScriptError>;

    /// Evaluates a suspending script (`identifier|body` form).
    ///
    /// The host must call `notify` once the asynchronous work finishes.
    /// The default evaluates `body` and notifies immediately.
    ///
    /// # Errors
    ///
    /// As [`ScriptHost::evaluate`].
    fn evaluate_suspended(
        &self,
        identifier: &str,
        body: &str,
        notify: Notify,
        ctx: &ScriptContext<'_>,
    ) -> Result<(), ScriptError> {
        debug!(identifier, "Evaluating suspending script synchronously");
        let result = self.evaluate(body, ctx);
        notify.notify();
        result
    }

    /// Evaluates a script-form precondition.
    ///
    /// # Errors
    ///
    /// A failing predicate counts as `false` for the call.
    fn predicate(&self, script: &str, ctx: &ScriptContext<'_>) -> Result<bool, ScriptError> {
        let _ = (script, ctx);
        Ok(true)
    }

    /// Evaluates a script-form dependency, returning extra parameters.
    ///
    /// # Errors
    ///
    /// A failing provider contributes nothing; the call proceeds.
    fn parameters(
        &self,
        script: &str,
        ctx: &ScriptContext<'_>,
    ) -> Result<Vec<Parameter>, ScriptError> {
        let _ = (script, ctx);
        Ok(Vec::new())
    }

    /// Navigates the page to `url`.
    fn redirect(&self, url: &str) {
        info!(url, "Redirect requested");
    }
}

/// Host that accepts every script and does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopScriptHost;

impl ScriptHost for NoopScriptHost {
    fn evaluate(&self, script: &str, _ctx: &ScriptContext<'_>) -> Result<(), ScriptError> {
        debug!(len = script.len(), "Skipping script evaluation");
        Ok(())
    }
}
