//! Control-plane request and response types.
//!
//! Trusted backends push messages through a single request/response call.
//! Raw form parameters are validated into a [`ControlRequest`] before they
//! reach the hub.

use crate::group::GroupKey;
use serde::Deserialize;
use std::fmt;

/// Raw control-plane parameters as received from the caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControlParams {
    /// Operation selector.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Target user id.
    pub to: Option<String>,
    /// Message body, unescaped.
    pub content: Option<String>,
}

/// The operation a control request asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlKind {
    /// Push `new_msg` to a group, or to everyone when no target is given.
    Publish,
    /// Push `qrcode_auth_success` to a group. A target is required.
    QrcodeAuthSuccess,
    /// Anything else, including a missing selector.
    Unsupported(String),
}

impl ControlKind {
    /// Parse an operation selector.
    #[must_use]
    pub fn parse(kind: Option<&str>) -> Self {
        match kind {
            Some("publish") => ControlKind::Publish,
            Some("qrcode_auth_success") => ControlKind::QrcodeAuthSuccess,
            other => ControlKind::Unsupported(other.unwrap_or_default().to_string()),
        }
    }
}

/// A validated control-plane request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRequest {
    /// Requested operation.
    pub kind: ControlKind,
    /// Target group; `None` when the caller gave no (or an empty) target.
    pub to: Option<GroupKey>,
    /// Markup-escaped message body.
    pub content: String,
}

impl ControlRequest {
    /// Create a request, escaping `content`.
    #[must_use]
    pub fn new(kind: ControlKind, to: Option<&str>, content: &str) -> Self {
        Self {
            kind,
            to: to.filter(|t| !t.is_empty()).map(GroupKey::from),
            content: escape_markup(content),
        }
    }

    /// Validate raw parameters.
    #[must_use]
    pub fn from_params(params: &ControlParams) -> Self {
        Self::new(
            ControlKind::parse(params.kind.as_deref()),
            params.to.as_deref(),
            params.content.as_deref().unwrap_or_default(),
        )
    }
}

impl From<ControlParams> for ControlRequest {
    fn from(params: ControlParams) -> Self {
        Self::from_params(&params)
    }
}

/// The single response to a control-plane request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlResponse {
    /// Dispatched; the target (if any) was online afterwards.
    SendOk,
    /// Unsupported operation; nothing dispatched.
    SendFail,
    /// A required parameter was missing; nothing dispatched.
    ParamsError,
    /// Dispatched, but the target had no connections afterwards.
    YouAreOffline,
}

impl ControlResponse {
    /// Wire form of the response.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlResponse::SendOk => "send_ok",
            ControlResponse::SendFail => "send_fail",
            ControlResponse::ParamsError => "params_error",
            ControlResponse::YouAreOffline => "you_are_offline",
        }
    }
}

impl fmt::Display for ControlResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Escape HTML special characters so pushed content cannot inject markup.
#[must_use]
pub fn escape_markup(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}
