//! # beacon-core
//!
//! Presence registry and group-messaging dispatcher for the Beacon relay.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **GroupRegistry** - Reference-counted member counts per user id
//! - **Group** - Send-target set of the connections bound to one user id
//! - **PresenceAggregator** - Change detection over online counts
//! - **Hub** - Login/disconnect handling, dispatch and the control plane
//! - **HubHandle** - Serialized access to a hub owned by a single task
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Connections │────▶│  Hub actor  │────▶│    Hub      │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ┌─────────────┐            ▲              │        │
//! │Control plane│────────────┘              ▼        ▼
//! └─────────────┘                    ┌──────────┐ ┌──────────┐
//!                                    │ Registry │ │ Presence │
//!                                    └──────────┘ └──────────┘
//! ```

pub mod actor;
pub mod connection;
pub mod control;
pub mod group;
pub mod hub;
pub mod message;
pub mod presence;
pub mod registry;

pub use actor::{spawn, HubError, HubHandle, DEFAULT_TICK_INTERVAL};
pub use connection::{ConnectionId, Outbox};
pub use control::{ControlKind, ControlParams, ControlRequest, ControlResponse};
pub use group::{Group, GroupKey};
pub use hub::{Hub, HubConfig, HubStats, LoginOutcome};
pub use message::{Message, Target};
pub use presence::{PresenceAggregator, PresenceSnapshot, DEFAULT_PRESENCE_TEMPLATE};
pub use registry::GroupRegistry;
