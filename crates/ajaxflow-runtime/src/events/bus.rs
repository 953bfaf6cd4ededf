//! EventBus - topic-based publish/subscribe.
//!
//! ```text
//! ┌──────────────────┐  publish   ┌──────────┐   sync    ┌─────────────┐
//! │ ResponseProcessor│ ─────────► │          │ ────────► │  handlers   │
//! │ AjaxCall         │            │ EventBus │           └─────────────┘
//! │ WebSocketBridge  │            │          │  async    ┌─────────────┐
//! └──────────────────┘            └──────────┘ ────────► │  stream()   │
//!                                                        └─────────────┘
//! ```
//!
//! Handlers run synchronously on the publishing thread, in subscription
//! order, before `publish` returns. This is what lets a `/dom/node/removing`
//! subscriber release resources tied to a node before it is detached.
//!
//! A panicking handler is logged and skipped; it never aborts the
//! publisher or the remaining handlers.

use ajaxflow_event::{Notification, Topic};
use ajaxflow_types::SubscriptionId;
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, trace};

/// Capacity of the async notification stream.
const STREAM_CAPACITY: usize = 256;

/// Subscriber callback.
pub type Handler = Arc<dyn Fn(&Notification) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Filter {
    Topic(Topic),
    All,
}

impl Filter {
    fn matches(&self, topic: &Topic) -> bool {
        match self {
            Self::Topic(t) => t == topic,
            Self::All => true,
        }
    }
}

struct Subscription {
    id: SubscriptionId,
    filter: Filter,
    handler: Handler,
}

/// Routes [`Notification`]s to subscribers.
///
/// # Example
///
/// ```
/// use ajaxflow_event::{Notification, Payload, Topic};
/// use ajaxflow_runtime::EventBus;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let bus = EventBus::new();
/// let seen = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&seen);
/// bus.subscribe(Topic::CallComplete, move |_| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// bus.publish(&Notification::new(Topic::CallComplete, Payload::Empty));
/// bus.publish(&Notification::new(Topic::CallDone, Payload::Empty));
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
/// ```
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    stream_tx: broadcast::Sender<Notification>,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        let (stream_tx, _) = broadcast::channel(STREAM_CAPACITY);
        Self {
            subscriptions: RwLock::new(Vec::new()),
            stream_tx,
        }
    }

    /// Subscribes `handler` to one topic.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.insert(Filter::Topic(topic), Arc::new(handler))
    }

    /// Subscribes `handler` to every topic.
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.insert(Filter::All, Arc::new(handler))
    }

    fn insert(&self, filter: Filter, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId::next();
        debug!(subscription = %id, filter = ?filter, "Subscribed");
        self.subscriptions.write().push(Subscription {
            id,
            filter,
            handler,
        });
        id
    }

    /// Removes one subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscriptions.write();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Removes every subscription bound to `topic`. Returns how many.
    pub fn unsubscribe_topic(&self, topic: &Topic) -> usize {
        let mut subs = self.subscriptions.write();
        let before = subs.len();
        subs.retain(|s| s.filter != Filter::Topic(topic.clone()));
        before - subs.len()
    }

    /// Removes all subscriptions.
    pub fn clear(&self) {
        self.subscriptions.write().clear();
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Async stream of every published notification.
    ///
    /// Slow receivers lag and lose the oldest messages; synchronous
    /// handlers are unaffected.
    #[must_use]
    pub fn stream(&self) -> broadcast::Receiver<Notification> {
        self.stream_tx.subscribe()
    }

    /// Delivers `notification` to matching handlers, then to streams.
    ///
    /// Handlers may subscribe, unsubscribe or publish re-entrantly; the
    /// set of handlers is fixed when `publish` starts.
    pub fn publish(&self, notification: &Notification) {
        let handlers: Vec<(SubscriptionId, Handler)> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.filter.matches(&notification.topic))
            .map(|s| (s.id, Arc::clone(&s.handler)))
            .collect();

        trace!(
            topic = notification.topic.path(),
            handlers = handlers.len(),
            "Publishing"
        );

        for (id, handler) in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(notification))).is_err() {
                error!(
                    subscription = %id,
                    topic = notification.topic.path(),
                    "Subscriber panicked"
                );
            }
        }

        // No receivers is the normal case.
        let _ = self.stream_tx.send(notification.clone());
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}
