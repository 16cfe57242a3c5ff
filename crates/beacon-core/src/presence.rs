//! Presence aggregation for Beacon.
//!
//! Presence is reduced to two numbers: how many distinct users are online
//! and how many connections (pages) they hold. The aggregator remembers the
//! last pair it broadcast and only reports a new one when it changes.

use crate::registry::GroupRegistry;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default presence message. `{users}` and `{pages}` are substituted.
pub const DEFAULT_PRESENCE_TEMPLATE: &str = "当前<b>{users}</b>人在线，共打开<b>{pages}</b>个页面";

/// Online counts at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    /// Distinct user ids with at least one bound connection.
    pub users: usize,
    /// Bound connections across all users.
    pub connections: usize,
}

impl PresenceSnapshot {
    /// Create a snapshot.
    #[must_use]
    pub const fn new(users: usize, connections: usize) -> Self {
        Self { users, connections }
    }

    /// Read the current counts from a registry.
    #[must_use]
    pub fn from_registry(registry: &GroupRegistry) -> Self {
        Self::new(registry.distinct_keys(), registry.total_members())
    }

    /// Render the snapshot into a display message.
    #[must_use]
    pub fn render(&self, template: &str) -> String {
        template
            .replace("{users}", &self.users.to_string())
            .replace("{pages}", &self.connections.to_string())
    }
}

/// Change detector over successive presence snapshots.
#[derive(Debug)]
pub struct PresenceAggregator {
    last: PresenceSnapshot,
    template: String,
}

impl PresenceAggregator {
    /// Create an aggregator with the default message template.
    #[must_use]
    pub fn new() -> Self {
        Self::with_template(DEFAULT_PRESENCE_TEMPLATE)
    }

    /// Create an aggregator with a custom message template.
    #[must_use]
    pub fn with_template(template: impl Into<String>) -> Self {
        Self {
            last: PresenceSnapshot::default(),
            template: template.into(),
        }
    }

    /// The last broadcast snapshot.
    #[must_use]
    pub fn last(&self) -> PresenceSnapshot {
        self.last
    }

    /// Render the last broadcast snapshot.
    #[must_use]
    pub fn last_message(&self) -> String {
        self.last.render(&self.template)
    }

    /// Compare the registry against the last broadcast snapshot.
    ///
    /// Returns the new snapshot if it changed; the caller is expected to
    /// broadcast it. Returns `None` when nothing changed.
    pub fn observe(&mut self, registry: &GroupRegistry) -> Option<PresenceSnapshot> {
        let current = PresenceSnapshot::from_registry(registry);
        if current == self.last {
            return None;
        }

        debug!(
            users = current.users,
            connections = current.connections,
            previous_users = self.last.users,
            previous_connections = self.last.connections,
            "Presence changed"
        );
        self.last = current;
        Some(current)
    }
}

impl Default for PresenceAggregator {
    fn default() -> Self {
        Self::new()
    }
}
