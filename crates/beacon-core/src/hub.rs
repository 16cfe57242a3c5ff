//! The presence hub.
//!
//! The hub owns all mutable presence state: live connections, their group
//! bindings, the reference-counted registry and the last broadcast presence
//! snapshot. It is a plain synchronous state machine; the actor in
//! [`crate::actor`] gives it a single owner so its methods never run
//! concurrently.

use crate::connection::{ConnectionId, ConnectionState, Outbox};
use crate::control::{ControlKind, ControlRequest, ControlResponse};
use crate::group::{Group, GroupKey};
use crate::message::Message;
use crate::presence::{PresenceAggregator, PresenceSnapshot, DEFAULT_PRESENCE_TEMPLATE};
use crate::registry::GroupRegistry;
use beacon_protocol::{Frame, Uid};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Presence message template (`{users}`, `{pages}`).
    pub presence_template: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            presence_template: DEFAULT_PRESENCE_TEMPLATE.to_string(),
        }
    }
}

/// Result of a login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The connection is now bound to this group.
    Bound(GroupKey),
    /// The connection was already bound; nothing changed.
    AlreadyBound(GroupKey),
    /// The connection is not registered (already disconnected).
    UnknownConnection,
}

/// The central presence hub.
pub struct Hub {
    /// Live connections indexed by id.
    connections: HashMap<ConnectionId, ConnectionState>,
    /// Send-target sets indexed by group key.
    groups: HashMap<GroupKey, Group>,
    /// Member counts per group key.
    registry: GroupRegistry,
    /// Last broadcast presence.
    presence: PresenceAggregator,
}

impl Hub {
    /// Create a new hub with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a new hub with custom configuration.
    #[must_use]
    pub fn with_config(config: HubConfig) -> Self {
        info!("Creating hub with config: {:?}", config);
        Self {
            connections: HashMap::new(),
            groups: HashMap::new(),
            registry: GroupRegistry::new(),
            presence: PresenceAggregator::with_template(config.presence_template),
        }
    }

    /// Get hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.connections.len(),
            bound_connections: self.registry.total_members(),
            users: self.registry.distinct_keys(),
            presence: self.presence.last(),
        }
    }

    /// Read-only view of the registry.
    #[must_use]
    pub fn registry(&self) -> &GroupRegistry {
        &self.registry
    }

    /// The last broadcast presence snapshot.
    #[must_use]
    pub fn last_presence(&self) -> PresenceSnapshot {
        self.presence.last()
    }

    /// The group a connection is bound to.
    #[must_use]
    pub fn group_of(&self, connection_id: &ConnectionId) -> Option<&GroupKey> {
        self.connections.get(connection_id).and_then(|c| c.group())
    }

    /// Check if a connection is registered.
    #[must_use]
    pub fn is_connected(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Register a new connection.
    ///
    /// Returns `false` (and keeps the existing record) if the id is already
    /// registered.
    pub fn connect(&mut self, connection_id: ConnectionId, outbox: Box<dyn Outbox>) -> bool {
        if self.connections.contains_key(&connection_id) {
            warn!(connection = %connection_id, "Duplicate connect ignored");
            return false;
        }

        self.connections
            .insert(connection_id.clone(), ConnectionState::new(outbox));
        debug!(
            connection = %connection_id,
            connections = self.connections.len(),
            "Connected"
        );
        true
    }

    /// Bind a connection to the group named by `uid`.
    ///
    /// Only the first login of a connection has any effect. On success the
    /// connection immediately receives the last broadcast presence message.
    pub fn login(&mut self, connection_id: &ConnectionId, uid: &Uid) -> LoginOutcome {
        let Some(connection) = self.connections.get_mut(connection_id) else {
            debug!(connection = %connection_id, "Login from unknown connection ignored");
            return LoginOutcome::UnknownConnection;
        };

        if let Some(existing) = connection.group() {
            trace!(connection = %connection_id, group = %existing, "Already logged in");
            return LoginOutcome::AlreadyBound(existing.clone());
        }

        let key = GroupKey::from(uid);
        connection.bind(key.clone());
        self.registry.bind(&key);
        self.groups
            .entry(key.clone())
            .or_insert_with(|| Group::new(key.clone()))
            .join(connection_id.clone());

        debug!(
            connection = %connection_id,
            group = %key,
            members = self.registry.count_of(key.as_str()),
            "Logged in"
        );

        let message = self.presence.last_message();
        self.send_to(connection_id, Frame::update_online_count(message));

        LoginOutcome::Bound(key)
    }

    /// Drop a connection and release its group binding.
    ///
    /// Returns the group the connection was bound to. Disconnecting an
    /// unknown connection is a no-op.
    pub fn disconnect(&mut self, connection_id: &ConnectionId) -> Option<GroupKey> {
        let Some(connection) = self.connections.remove(connection_id) else {
            trace!(connection = %connection_id, "Disconnect of unknown connection ignored");
            return None;
        };

        let key = connection.group()?.clone();
        self.registry.unbind(&key);

        if let Some(group) = self.groups.get_mut(&key) {
            group.leave(connection_id);
            if group.is_empty() {
                self.groups.remove(&key);
                debug!(group = %key, "Deleted empty group");
            }
        }

        debug!(
            connection = %connection_id,
            group = %key,
            members = self.registry.count_of(key.as_str()),
            "Disconnected"
        );

        Some(key)
    }

    /// Send a frame to a single connection.
    pub fn send_to(&self, connection_id: &ConnectionId, frame: Frame) -> bool {
        let Some(connection) = self.connections.get(connection_id) else {
            return false;
        };
        let message = Arc::new(Message::direct(connection_id.clone(), frame));
        trace!(to = %message.target, event = message.event(), "Send");
        connection.deliver(message)
    }

    /// Send a frame to every connection bound to `key`.
    ///
    /// Returns the number of connections the frame was handed to.
    pub fn send_to_group(&self, key: &GroupKey, frame: Frame) -> usize {
        let Some(group) = self.groups.get(key) else {
            trace!(group = %key, "Send to empty group");
            return 0;
        };

        let message = Arc::new(Message::to_group(key.clone(), frame));
        let count = group
            .members()
            .filter_map(|id| self.connections.get(id))
            .filter(|c| c.deliver(Arc::clone(&message)))
            .count();

        trace!(
            to = %message.target,
            event = message.event(),
            recipients = count,
            "Sent to group"
        );
        count
    }

    /// Send a frame to every live connection, bound or not.
    ///
    /// Returns the number of connections the frame was handed to.
    pub fn send_to_all(&self, frame: Frame) -> usize {
        let message = Arc::new(Message::broadcast(frame));
        let count = self
            .connections
            .values()
            .filter(|c| c.deliver(Arc::clone(&message)))
            .count();

        trace!(
            to = %message.target,
            event = message.event(),
            recipients = count,
            "Broadcast"
        );
        count
    }

    /// Run one presence check.
    ///
    /// Broadcasts `update_online_count` to everyone when the counts changed
    /// since the last broadcast and returns the new snapshot.
    pub fn tick(&mut self) -> Option<PresenceSnapshot> {
        let snapshot = self.presence.observe(&self.registry)?;
        let message = self.presence.last_message();
        let recipients = self.send_to_all(Frame::update_online_count(message));
        debug!(
            users = snapshot.users,
            connections = snapshot.connections,
            recipients,
            "Presence broadcast"
        );
        Some(snapshot)
    }

    /// Handle a control-plane request.
    ///
    /// Reachability is checked after the dispatch, so a target whose last
    /// connection drops in between still gets the message attempt but is
    /// reported offline.
    pub fn handle_control(&self, request: ControlRequest) -> ControlResponse {
        let ControlRequest { kind, to, content } = request;

        match kind {
            ControlKind::Publish => match &to {
                Some(key) => {
                    self.send_to_group(key, Frame::new_msg(content));
                }
                None => {
                    self.send_to_all(Frame::new_msg(content));
                }
            },
            ControlKind::QrcodeAuthSuccess => match &to {
                Some(key) => {
                    self.send_to_group(key, Frame::qrcode_auth_success(content));
                }
                None => {
                    debug!("qrcode_auth_success without target");
                    return ControlResponse::ParamsError;
                }
            },
            ControlKind::Unsupported(kind) => {
                debug!(kind = %kind, "Unsupported control request");
                return ControlResponse::SendFail;
            }
        }

        match to {
            Some(key) if self.registry.count_of(key.as_str()) == 0 => {
                debug!(group = %key, "Control target offline");
                ControlResponse::YouAreOffline
            }
            _ => ControlResponse::SendOk,
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// Hub statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Live connections, bound or not.
    pub connections: usize,
    /// Connections bound to a group.
    pub bound_connections: usize,
    /// Distinct groups with members.
    pub users: usize,
    /// Last broadcast presence snapshot.
    pub presence: PresenceSnapshot,
}
