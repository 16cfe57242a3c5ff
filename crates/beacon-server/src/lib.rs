//! # beacon-server
//!
//! WebSocket transport, control-plane HTTP surface and QR rendering around
//! the Beacon hub.

pub mod client_ip;
pub mod config;
pub mod control;
pub mod handlers;
pub mod metrics;
pub mod qr;

pub use config::Config;
pub use handlers::{client_app, run_server, serve, AppState};
