//! The two change listeners.
//!
//! [`ChangeListener`] consumes row-level notifications from the relational
//! store's change channel. [`CacheListener`] consumes key-space events from the
//! key/value store. Each owns one long-lived task and reports its subscription
//! health through a shared [`ConnectionMonitor`].

mod cache_listener;
mod change_listener;
mod glob;
mod health;
mod notification;
pub use cache_listener::*;
pub use change_listener::*;
pub use glob::*;
pub use health::*;
pub use notification::*;

#[cfg(test)]
mod cache_listener_test;
