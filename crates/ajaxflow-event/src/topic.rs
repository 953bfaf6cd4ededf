//! Topic paths.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A pub/sub topic.
///
/// Built-in topics have fixed paths. Anything else is carried as
/// [`Topic::Custom`] so widgets can publish their own.
///
/// # Example
///
/// ```
/// use ajaxflow_event::Topic;
///
/// assert_eq!(Topic::NodeRemoving.path(), "/dom/node/removing");
/// assert_eq!(Topic::from_path("/ajax/call/done"), Topic::CallDone);
/// assert_eq!(
///     Topic::from_path("/palette/changed"),
///     Topic::Custom("/palette/changed".into())
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Topic {
    /// An element is about to be detached by a component replacement.
    NodeRemoving,
    /// A replacement element has been inserted.
    NodeAdded,
    /// A call object was created.
    CallInit,
    /// Preconditions passed and before handlers ran; the request is built next.
    CallBefore,
    /// A precondition rejected the call.
    CallPrecondition,
    /// The channel granted execution and the request is about to go out.
    CallBeforeSend,
    /// The response was applied successfully.
    CallSuccess,
    /// The call failed (status, network, timeout, envelope).
    CallFailure,
    /// Success or failure handlers finished.
    CallComplete,
    /// The call was handed to the channel (fires right after scheduling).
    CallAfter,
    /// All suspend locks are released and the channel is about to be freed.
    CallDone,
    /// Websocket connection established.
    SocketOpen,
    /// Websocket message received.
    SocketMessage,
    /// Websocket connection closed.
    SocketClosed,
    /// Websocket error.
    SocketError,
    /// Any other path.
    Custom(String),
}

impl Topic {
    /// Every built-in topic, in lifecycle order.
    pub const BUILTIN: [Topic; 15] = [
        Topic::NodeRemoving,
        Topic::NodeAdded,
        Topic::CallInit,
        Topic::CallBefore,
        Topic::CallPrecondition,
        Topic::CallBeforeSend,
        Topic::CallSuccess,
        Topic::CallFailure,
        Topic::CallComplete,
        Topic::CallAfter,
        Topic::CallDone,
        Topic::SocketOpen,
        Topic::SocketMessage,
        Topic::SocketClosed,
        Topic::SocketError,
    ];

    /// The slash-separated path.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::NodeRemoving => "/dom/node/removing",
            Self::NodeAdded => "/dom/node/added",
            Self::CallInit => "/ajax/call/init",
            Self::CallBefore => "/ajax/call/before",
            Self::CallPrecondition => "/ajax/call/precondition",
            Self::CallBeforeSend => "/ajax/call/beforeSend",
            Self::CallSuccess => "/ajax/call/success",
            Self::CallFailure => "/ajax/call/failure",
            Self::CallComplete => "/ajax/call/complete",
            Self::CallAfter => "/ajax/call/after",
            Self::CallDone => "/ajax/call/done",
            Self::SocketOpen => "/websocket/open",
            Self::SocketMessage => "/websocket/message",
            Self::SocketClosed => "/websocket/closed",
            Self::SocketError => "/websocket/error",
            Self::Custom(path) => path,
        }
    }

    /// Resolves a path, mapping unknown paths to [`Topic::Custom`].
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        Self::BUILTIN
            .iter()
            .find(|t| t.path() == path)
            .cloned()
            .unwrap_or_else(|| Self::Custom(path.to_string()))
    }

    /// Whether this topic belongs to the call lifecycle.
    #[must_use]
    pub fn is_call_lifecycle(&self) -> bool {
        self.path().starts_with("/ajax/call/")
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl From<String> for Topic {
    fn from(value: String) -> Self {
        Self::from_path(&value)
    }
}

impl From<Topic> for String {
    fn from(value: Topic) -> Self {
        value.path().to_string()
    }
}
