//! Listener connection health, published through a `tokio::sync::watch`
//! channel.

use tokio::sync::watch;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LinkState {
    /// Subscription not started yet
    #[default]
    Connecting,
    Connected,
    /// Subscriber stream ended without a shutdown request. Reconnecting is
    /// up to the embedding application.
    Lost(String),
    /// Stopped by shutdown
    Stopped,
}

impl LinkState {
    pub fn is_lost(&self) -> bool {
        matches!(self, LinkState::Lost(_))
    }
}

/// Health of both listener subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionState {
    pub database: LinkState,
    pub cache: LinkState,
}

impl ConnectionState {
    pub fn is_lost(&self) -> bool {
        self.database.is_lost() || self.cache.is_lost()
    }
}

/// Which listener a state change belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Database,
    Cache,
}

/// Holds an internal receiver so updates never fail when no application
/// receiver is alive.
#[derive(Debug)]
pub struct ConnectionMonitor {
    tx: watch::Sender<ConnectionState>,
    _rx: watch::Receiver<ConnectionState>,
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(ConnectionState::default());
        Self { tx, _rx: rx }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> ConnectionState {
        self.tx.borrow().clone()
    }

    pub fn set(
        &self,
        link: Link,
        state: LinkState,
    ) {
        self.tx.send_modify(|current| match link {
            Link::Database => current.database = state,
            Link::Cache => current.cache = state,
        });
    }
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new()
    }
}
