//! Client address resolution for `get_ip`.

use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Proxy headers consulted before the socket peer, in order.
const FORWARDING_HEADERS: [&str; 2] = ["x-forwarded-for", "client-ip"];

/// Resolve the address to report back to a client.
///
/// Uses `X-Forwarded-For`, then `Client-IP`, then the peer's IP. Header
/// values are returned as sent (trimmed), so a proxy chain comes back whole.
#[must_use]
pub fn resolve(headers: &HeaderMap, peer: SocketAddr) -> String {
    FORWARDING_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map_or_else(|| peer.ip().to_string(), str::to_string)
}
