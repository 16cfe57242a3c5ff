//! Metrics collection and export for Beacon.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use beacon_core::PresenceSnapshot;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "beacon_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "beacon_connections_active";
    pub const LOGINS_TOTAL: &str = "beacon_logins_total";
    pub const ONLINE_USERS: &str = "beacon_online_users";
    pub const ONLINE_PAGES: &str = "beacon_online_pages";
    pub const PRESENCE_BROADCASTS_TOTAL: &str = "beacon_presence_broadcasts_total";
    pub const MESSAGES_TOTAL: &str = "beacon_messages_total";
    pub const MESSAGES_BYTES: &str = "beacon_messages_bytes";
    pub const CONTROL_REQUESTS_TOTAL: &str = "beacon_control_requests_total";
    pub const QR_RENDER_SECONDS: &str = "beacon_qr_render_seconds";
    pub const ERRORS_TOTAL: &str = "beacon_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of open connections"
    );
    metrics::describe_counter!(names::LOGINS_TOTAL, "Total number of login requests");
    metrics::describe_gauge!(
        names::ONLINE_USERS,
        "Distinct users online at the last presence broadcast"
    );
    metrics::describe_gauge!(
        names::ONLINE_PAGES,
        "Bound connections at the last presence broadcast"
    );
    metrics::describe_counter!(
        names::PRESENCE_BROADCASTS_TOTAL,
        "Total number of presence broadcasts"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of frames processed");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Total bytes of frames processed");
    metrics::describe_counter!(
        names::CONTROL_REQUESTS_TOTAL,
        "Control-plane requests by outcome"
    );
    metrics::describe_histogram!(names::QR_RENDER_SECONDS, "QR code render time in seconds");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a login request.
pub fn record_login() {
    counter!(names::LOGINS_TOTAL).increment(1);
}

/// Record a presence broadcast.
pub fn record_presence(snapshot: PresenceSnapshot) {
    counter!(names::PRESENCE_BROADCASTS_TOTAL).increment(1);
    gauge!(names::ONLINE_USERS).set(snapshot.users as f64);
    gauge!(names::ONLINE_PAGES).set(snapshot.connections as f64);
}

/// Record a frame.
pub fn record_message(bytes: usize, direction: &str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction.to_string()).increment(1);
    counter!(names::MESSAGES_BYTES, "direction" => direction.to_string()).increment(bytes as u64);
}

/// Record a control-plane request outcome.
pub fn record_control(outcome: &str) {
    counter!(names::CONTROL_REQUESTS_TOTAL, "outcome" => outcome.to_string()).increment(1);
}

/// Record QR render time.
pub fn record_qr_render(seconds: f64) {
    histogram!(names::QR_RENDER_SECONDS).record(seconds);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: every call must be a silent no-op.
        let _guard = ConnectionMetricsGuard::new();
        record_login();
        record_presence(PresenceSnapshot::new(1, 2));
        record_control("send_ok");
        record_qr_render(0.01);
    }
}
