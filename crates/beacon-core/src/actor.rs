//! Serialized access to the hub.
//!
//! A single task owns the [`Hub`] and applies commands from an mpsc inbox
//! one at a time, interleaved with the presence ticker. Commands sent from
//! the same handle are applied in order, so a connection's disconnect
//! always observes its earlier login.

use crate::connection::{ConnectionId, Outbox};
use crate::control::{ControlRequest, ControlResponse};
use crate::hub::{Hub, HubStats};
use crate::presence::PresenceSnapshot;
use beacon_protocol::Uid;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Default presence tick period.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Hub actor errors.
#[derive(Debug, Error)]
pub enum HubError {
    /// The actor task has stopped.
    #[error("Hub is not running")]
    Closed,
}

enum Command {
    Connect {
        id: ConnectionId,
        outbox: Box<dyn Outbox>,
    },
    Login {
        id: ConnectionId,
        uid: Uid,
    },
    Disconnect {
        id: ConnectionId,
    },
    Control {
        request: ControlRequest,
        reply: oneshot::Sender<ControlResponse>,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
}

/// Cloneable handle to the hub actor.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<Command>,
    presence: watch::Receiver<PresenceSnapshot>,
}

impl HubHandle {
    fn send(&self, command: Command) -> Result<(), HubError> {
        self.tx.send(command).map_err(|_| HubError::Closed)
    }

    /// Register a connection with its outbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub fn connect(&self, id: ConnectionId, outbox: Box<dyn Outbox>) -> Result<(), HubError> {
        self.send(Command::Connect { id, outbox })
    }

    /// Bind a connection to a user group.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub fn login(&self, id: ConnectionId, uid: Uid) -> Result<(), HubError> {
        self.send(Command::Login { id, uid })
    }

    /// Remove a connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub fn disconnect(&self, id: ConnectionId) -> Result<(), HubError> {
        self.send(Command::Disconnect { id })
    }

    /// Run a control-plane request and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub async fn control(&self, request: ControlRequest) -> Result<ControlResponse, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Control { request, reply })?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Fetch hub statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stats { reply })?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Subscribe to presence broadcasts.
    #[must_use]
    pub fn presence(&self) -> watch::Receiver<PresenceSnapshot> {
        self.presence.clone()
    }
}

/// Spawn the hub actor on the current runtime.
///
/// The actor stops once every [`HubHandle`] has been dropped.
pub fn spawn(hub: Hub, tick_interval: Duration) -> (HubHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (presence_tx, presence_rx) = watch::channel(hub.last_presence());
    let task = tokio::spawn(run(hub, rx, presence_tx, tick_interval));
    let handle = HubHandle {
        tx,
        presence: presence_rx,
    };
    (handle, task)
}

async fn run(
    mut hub: Hub,
    mut rx: mpsc::UnboundedReceiver<Command>,
    presence_tx: watch::Sender<PresenceSnapshot>,
    tick_interval: Duration,
) {
    let period = tick_interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(tick_ms = period.as_millis() as u64, "Hub started");

    loop {
        tokio::select! {
            biased;

            _ = ticker.tick() => {
                if let Some(snapshot) = hub.tick() {
                    presence_tx.send_replace(snapshot);
                }
            }

            command = rx.recv() => {
                match command {
                    Some(command) => apply(&mut hub, command),
                    None => break,
                }
            }
        }
    }

    info!("Hub stopped");
}

fn apply(hub: &mut Hub, command: Command) {
    match command {
        Command::Connect { id, outbox } => {
            hub.connect(id, outbox);
        }
        Command::Login { id, uid } => {
            hub.login(&id, &uid);
        }
        Command::Disconnect { id } => {
            hub.disconnect(&id);
        }
        Command::Control { request, reply } => {
            let response = hub.handle_control(request);
            if reply.send(response).is_err() {
                debug!("Control caller went away before the response");
            }
        }
        Command::Stats { reply } => {
            if reply.send(hub.stats()).is_err() {
                debug!("Stats caller went away before the response");
            }
        }
    }
}
