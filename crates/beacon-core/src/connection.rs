//! Connection records held by the hub.
//!
//! The transport owns the socket; the hub only keeps an id, the optional
//! group binding, and an [`Outbox`] used to hand frames to the transport.

use crate::group::GroupKey;
use crate::message::Message;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(Arc<str>);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Generate a unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let counter = CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self::new(format!("conn_{:x}_{:x}", timestamp, counter))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Per-connection send capability.
///
/// Delivery never blocks: an outbox either accepts the message or reports
/// that the connection is gone.
pub trait Outbox: Send {
    /// Hand a message to the transport. Returns `false` if the connection
    /// can no longer receive.
    fn deliver(&self, message: Arc<Message>) -> bool;
}

impl Outbox for mpsc::UnboundedSender<Arc<Message>> {
    fn deliver(&self, message: Arc<Message>) -> bool {
        self.send(message).is_ok()
    }
}

/// State the hub keeps for one live connection.
pub struct ConnectionState {
    group: Option<GroupKey>,
    outbox: Box<dyn Outbox>,
}

impl ConnectionState {
    /// Create an unbound connection record.
    #[must_use]
    pub fn new(outbox: Box<dyn Outbox>) -> Self {
        Self {
            group: None,
            outbox,
        }
    }

    /// The group this connection is bound to, if it has logged in.
    #[must_use]
    pub fn group(&self) -> Option<&GroupKey> {
        self.group.as_ref()
    }

    /// Check if the connection has logged in.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.group.is_some()
    }

    /// Record the binding. Returns `false` if the connection was already bound.
    pub(crate) fn bind(&mut self, key: GroupKey) -> bool {
        if self.group.is_some() {
            return false;
        }
        self.group = Some(key);
        true
    }

    /// Deliver a message through the outbox.
    pub fn deliver(&self, message: Arc<Message>) -> bool {
        self.outbox.deliver(message)
    }
}

impl fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionState")
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_protocol::Frame;

    #[test]
    fn test_connection_id_generation() {
        let id1 = ConnectionId::generate();
        let id2 = ConnectionId::generate();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("conn_"));
    }

    #[test]
    fn test_connection_binds_once() {
        let (tx, _rx) = mpsc::unbounded_channel::<Arc<Message>>();
        let mut state = ConnectionState::new(Box::new(tx));

        assert!(!state.is_bound());
        assert!(state.bind(GroupKey::new("7")));
        assert!(!state.bind(GroupKey::new("8")));
        assert_eq!(state.group(), Some(&GroupKey::new("7")));
    }

    #[test]
    fn test_outbox_reports_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel::<Arc<Message>>();
        let state = ConnectionState::new(Box::new(tx));
        let message = Arc::new(Message::broadcast(Frame::new_msg("hi")));

        assert!(state.deliver(Arc::clone(&message)));
        drop(rx);
        assert!(!state.deliver(message));
    }
}
