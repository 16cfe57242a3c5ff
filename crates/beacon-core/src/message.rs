//! Outbound message envelope.
//!
//! The hub wraps every frame it dispatches in a [`Message`] and shares it
//! between recipients behind an `Arc`, so a broadcast encodes nothing and
//! copies nothing until the transport writes it.

use crate::connection::ConnectionId;
use crate::group::GroupKey;
use beacon_protocol::Frame;
use std::fmt;

/// Who a message was addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A single connection.
    Connection(ConnectionId),
    /// Every connection bound to a group.
    Group(GroupKey),
    /// Every live connection.
    All,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Connection(id) => write!(f, "connection:{id}"),
            Target::Group(key) => write!(f, "group:{key}"),
            Target::All => f.write_str("all"),
        }
    }
}

/// A frame on its way to one or more connections.
#[derive(Debug, Clone)]
pub struct Message {
    /// Addressing used when the message was dispatched.
    pub target: Target,
    /// The frame to write.
    pub frame: Frame,
}

impl Message {
    /// Create a new message.
    #[must_use]
    pub fn new(target: Target, frame: Frame) -> Self {
        Self { target, frame }
    }

    /// Create a message for every live connection.
    #[must_use]
    pub fn broadcast(frame: Frame) -> Self {
        Self::new(Target::All, frame)
    }

    /// Create a message for one group.
    #[must_use]
    pub fn to_group(key: GroupKey, frame: Frame) -> Self {
        Self::new(Target::Group(key), frame)
    }

    /// Create a message for a single connection.
    #[must_use]
    pub fn direct(connection_id: ConnectionId, frame: Frame) -> Self {
        Self::new(Target::Connection(connection_id), frame)
    }

    /// Event name of the carried frame.
    #[must_use]
    pub fn event(&self) -> &'static str {
        self.frame.event()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::to_group(GroupKey::new("7"), Frame::new_msg("hello"));
        assert_eq!(msg.target, Target::Group(GroupKey::new("7")));
        assert_eq!(msg.event(), "new_msg");
    }

    #[test]
    fn test_target_display() {
        assert_eq!(Target::All.to_string(), "all");
        assert_eq!(Target::Group(GroupKey::new("7")).to_string(), "group:7");
        assert_eq!(
            Target::Connection(ConnectionId::new("conn_1")).to_string(),
            "connection:conn_1"
        );
    }
}
