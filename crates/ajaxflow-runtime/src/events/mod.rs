//! Notification routing.

mod bus;

pub use bus::{EventBus, Handler};
