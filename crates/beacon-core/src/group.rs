//! Group abstraction for Beacon.
//!
//! A group is the send-target set of every connection bound to the same
//! user id.

use crate::connection::ConnectionId;
use beacon_protocol::Uid;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Normalized user identifier naming a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey(Arc<str>);

impl GroupKey {
    /// Create a group key from its normalized string form.
    #[must_use]
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    /// Get the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Uid> for GroupKey {
    fn from(uid: &Uid) -> Self {
        Self::new(uid.normalize())
    }
}

impl From<&str> for GroupKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for GroupKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl std::borrow::Borrow<str> for GroupKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// The connections currently bound to one group key.
#[derive(Debug)]
pub struct Group {
    key: GroupKey,
    members: HashSet<ConnectionId>,
}

impl Group {
    /// Create an empty group.
    #[must_use]
    pub fn new(key: GroupKey) -> Self {
        Self {
            key,
            members: HashSet::new(),
        }
    }

    /// Get the group key.
    #[must_use]
    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    /// Add a connection to the send-target set.
    ///
    /// Returns `true` if the connection was not already a member.
    pub fn join(&mut self, connection_id: ConnectionId) -> bool {
        let added = self.members.insert(connection_id.clone());
        if added {
            debug!(group = %self.key, connection = %connection_id, "Connection joined group");
        }
        added
    }

    /// Remove a connection from the send-target set.
    ///
    /// Returns `true` if the connection was a member.
    pub fn leave(&mut self, connection_id: &ConnectionId) -> bool {
        let removed = self.members.remove(connection_id);
        if removed {
            debug!(group = %self.key, connection = %connection_id, "Connection left group");
        }
        removed
    }

    /// Check if a connection is a member.
    #[must_use]
    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.members.contains(connection_id)
    }

    /// Iterate over member connection ids.
    pub fn members(&self) -> impl Iterator<Item = &ConnectionId> {
        self.members.iter()
    }

    /// Get the number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
