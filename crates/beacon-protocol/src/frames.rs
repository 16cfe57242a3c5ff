//! Frame types for the Beacon protocol.
//!
//! A frame is serialized as `{"event": <name>, "data": <payload>}` in both
//! encodings. Events without a payload omit `data`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Current protocol version, announced in the `connected` frame.
pub const PROTOCOL_VERSION: u8 = 1;

/// User identifier as supplied by a client at login.
///
/// Clients may send the uid as a string or as a number; both are accepted
/// and normalized to the same string form, so `7` and `"7"` name the same
/// group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Uid {
    Text(String),
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl Uid {
    /// The normalized string form used as the group key.
    #[must_use]
    pub fn normalize(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Uid::Text(s) => f.write_str(s),
            Uid::Int(n) => write!(f, "{n}"),
            Uid::UInt(n) => write!(f, "{n}"),
            Uid::Float(n) => write!(f, "{n}"),
        }
    }
}

impl From<String> for Uid {
    fn from(s: String) -> Self {
        Uid::Text(s)
    }
}

impl From<&str> for Uid {
    fn from(s: &str) -> Self {
        Uid::Text(s.to_string())
    }
}

impl From<i64> for Uid {
    fn from(n: i64) -> Self {
        Uid::Int(n)
    }
}

/// A protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Frame {
    /// Bind this connection to a user group.
    #[serde(rename = "login")]
    Login(Uid),

    /// Ask the server for the client's address.
    #[serde(rename = "get_ip")]
    GetIp,

    /// Ask the server to render text as a QR code image.
    #[serde(rename = "qr_code_generator")]
    QrCodeGenerator(String),

    /// Connection established.
    #[serde(rename = "connected")]
    Connected {
        /// Unique connection identifier.
        connection_id: String,
        /// Protocol version spoken by the server.
        version: u8,
    },

    /// Presence message ("N users online, M pages open").
    #[serde(rename = "update_online_count")]
    UpdateOnlineCount(String),

    /// Message published through the control plane.
    #[serde(rename = "new_msg")]
    NewMsg(String),

    /// QR login confirmation published through the control plane.
    #[serde(rename = "qrcode_auth_success")]
    QrcodeAuthSuccess(String),

    /// Reply to `get_ip`.
    #[serde(rename = "get_ip_from_server")]
    GetIpFromServer(String),

    /// Reply to `qr_code_generator` carrying the encoded image.
    #[serde(rename = "qr_code_generator_from_server")]
    QrCodeGeneratorFromServer(#[serde(with = "serde_bytes")] Vec<u8>),
}

impl Frame {
    /// Get the event name of this frame.
    #[must_use]
    pub fn event(&self) -> &'static str {
        match self {
            Frame::Login(_) => "login",
            Frame::GetIp => "get_ip",
            Frame::QrCodeGenerator(_) => "qr_code_generator",
            Frame::Connected { .. } => "connected",
            Frame::UpdateOnlineCount(_) => "update_online_count",
            Frame::NewMsg(_) => "new_msg",
            Frame::QrcodeAuthSuccess(_) => "qrcode_auth_success",
            Frame::GetIpFromServer(_) => "get_ip_from_server",
            Frame::QrCodeGeneratorFromServer(_) => "qr_code_generator_from_server",
        }
    }

    /// Create a new Login frame.
    #[must_use]
    pub fn login(uid: impl Into<Uid>) -> Self {
        Frame::Login(uid.into())
    }

    /// Create a new Connected frame.
    #[must_use]
    pub fn connected(connection_id: impl Into<String>) -> Self {
        Frame::Connected {
            connection_id: connection_id.into(),
            version: PROTOCOL_VERSION,
        }
    }

    /// Create a new UpdateOnlineCount frame.
    #[must_use]
    pub fn update_online_count(message: impl Into<String>) -> Self {
        Frame::UpdateOnlineCount(message.into())
    }

    /// Create a new NewMsg frame.
    #[must_use]
    pub fn new_msg(content: impl Into<String>) -> Self {
        Frame::NewMsg(content.into())
    }

    /// Create a new QrcodeAuthSuccess frame.
    #[must_use]
    pub fn qrcode_auth_success(content: impl Into<String>) -> Self {
        Frame::QrcodeAuthSuccess(content.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_event_names() {
        assert_eq!(Frame::login("7").event(), "login");
        assert_eq!(Frame::GetIp.event(), "get_ip");
        assert_eq!(Frame::new_msg("hi").event(), "new_msg");
        assert_eq!(
            Frame::QrCodeGeneratorFromServer(vec![1, 2]).event(),
            "qr_code_generator_from_server"
        );
    }

    #[test]
    fn test_uid_normalization() {
        assert_eq!(Uid::from("7").normalize(), "7");
        assert_eq!(Uid::Int(7).normalize(), "7");
        assert_eq!(Uid::UInt(u64::MAX).normalize(), u64::MAX.to_string());
        assert_eq!(Uid::Float(2.0).normalize(), "2");
        assert_eq!(Uid::Float(1.5).normalize(), "1.5");
    }

    #[test]
    fn test_login_accepts_numeric_and_string_uids() {
        let numeric: Frame = serde_json::from_str(r#"{"event":"login","data":7}"#).unwrap();
        let text: Frame = serde_json::from_str(r#"{"event":"login","data":"7"}"#).unwrap();

        match (numeric, text) {
            (Frame::Login(a), Frame::Login(b)) => assert_eq!(a.normalize(), b.normalize()),
            other => panic!("Expected two login frames, got {:?}", other),
        }
    }

    #[test]
    fn test_unit_event_without_data() {
        let frame: Frame = serde_json::from_str(r#"{"event":"get_ip"}"#).unwrap();
        assert_eq!(frame, Frame::GetIp);
    }
}
