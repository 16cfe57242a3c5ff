//! Server configuration.
//!
//! Configuration is layered from:
//! - Built-in defaults
//! - A TOML file (`BEACON_CONFIG`, or the first of the default paths that exists)
//! - Environment variables (`BEACON_PORT`, `BEACON_PRESENCE__TICK_INTERVAL_MS`, ...)

use crate::qr::{parse_ec_level, QrOptions};
use anyhow::{bail, Context, Result};
use beacon_core::DEFAULT_PRESENCE_TEMPLATE;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file locations, in lookup order.
const CONFIG_PATHS: [&str; 3] = [
    "beacon.toml",
    "/etc/beacon/beacon.toml",
    "~/.config/beacon/beacon.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host the client socket binds to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the client socket listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Control-plane listener.
    #[serde(default)]
    pub control: ControlConfig,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Presence broadcasting.
    #[serde(default)]
    pub presence: PresenceConfig,

    /// QR code rendering.
    #[serde(default)]
    pub qr: QrConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Control-plane listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Host to bind to. Only trusted backends should reach it.
    #[serde(default = "default_control_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_control_port")]
    pub port: u16,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for the WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Presence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// How often online counts are checked, in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Message template; `{users}` and `{pages}` are substituted.
    #[serde(default = "default_presence_template")]
    pub message_template: String,
}

/// QR rendering configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrConfig {
    /// Edge length of the code in pixels, without padding.
    #[serde(default = "default_qr_size")]
    pub size: u32,

    /// Padding around the code in pixels.
    #[serde(default = "default_qr_padding")]
    pub padding: u32,

    /// Error correction level: low, medium, quartile or high.
    #[serde(default = "default_qr_error_correction")]
    pub error_correction: String,

    /// Module color as RGBA.
    #[serde(default = "default_qr_foreground")]
    pub foreground: [u8; 4],

    /// Background color as RGBA.
    #[serde(default = "default_qr_background")]
    pub background: [u8; 4],

    /// Caption for the code.
    #[serde(default = "default_qr_label")]
    pub label: Option<String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    2120
}

fn default_control_host() -> String {
    "127.0.0.1".to_string()
}

fn default_control_port() -> u16 {
    2121
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_tick_interval() -> u64 {
    1_000 // 1 second
}

fn default_presence_template() -> String {
    DEFAULT_PRESENCE_TEMPLATE.to_string()
}

fn default_qr_size() -> u32 {
    300
}

fn default_qr_padding() -> u32 {
    10
}

fn default_qr_error_correction() -> String {
    "high".to_string()
}

fn default_qr_foreground() -> [u8; 4] {
    [0, 0, 0, 255]
}

fn default_qr_background() -> [u8; 4] {
    [255, 255, 255, 255]
}

fn default_qr_label() -> Option<String> {
    Some("Scan the code".to_string())
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            control: ControlConfig::default(),
            transport: TransportConfig::default(),
            presence: PresenceConfig::default(),
            qr: QrConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            host: default_control_host(),
            port: default_control_port(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            message_template: default_presence_template(),
        }
    }
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            size: default_qr_size(),
            padding: default_qr_padding(),
            error_correction: default_qr_error_correction(),
            foreground: default_qr_foreground(),
            background: default_qr_background(),
            label: default_qr_label(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from the default locations and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or if
    /// the result is invalid.
    pub fn load() -> Result<Self> {
        let path = match std::env::var("BEACON_CONFIG") {
            Ok(path) => Some(PathBuf::from(shellexpand::tilde(&path).as_ref())),
            Err(_) => CONFIG_PATHS
                .iter()
                .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
                .find(|p| p.exists()),
        };

        Self::layered(path.as_deref())
    }

    /// Load configuration from a specific file, with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::layered(Some(path.as_ref()))
    }

    fn layered(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix("BEACON")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .with_context(|| match path {
                Some(p) => format!("Failed to load config file: {}", p.display()),
                None => "Failed to load config from environment".to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.presence.tick_interval_ms == 0 {
            bail!("presence.tick_interval_ms must be positive");
        }
        if !self.transport.websocket_path.starts_with('/') {
            bail!("transport.websocket_path must start with '/'");
        }
        self.qr.options()?;
        Ok(())
    }

    /// Get the socket address the client listener binds to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form an address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        parse_addr(&self.host, self.port)
    }

    /// Get the socket address the control plane binds to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form an address.
    pub fn control_addr(&self) -> Result<SocketAddr> {
        parse_addr(&self.control.host, self.control.port)
    }
}

impl PresenceConfig {
    /// The tick period.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl QrConfig {
    /// Build encoder options.
    ///
    /// # Errors
    ///
    /// Returns an error if the error correction level is unknown.
    pub fn options(&self) -> Result<QrOptions> {
        let Some(error_correction) = parse_ec_level(&self.error_correction) else {
            bail!(
                "qr.error_correction must be low, medium, quartile or high (got {:?})",
                self.error_correction
            );
        };

        Ok(QrOptions {
            size: self.size,
            padding: self.padding,
            error_correction,
            foreground: self.foreground,
            background: self.background,
            label: self.label.clone(),
        })
    }
}

fn parse_addr(host: &str, port: u16) -> Result<SocketAddr> {
    format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid host:port {}:{}", host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 2120);
        assert_eq!(config.control.port, 2121);
        assert_eq!(config.presence.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.qr.size, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_addrs() {
        let config = Config::default();
        assert_eq!(config.bind_addr().unwrap().port(), 2120);
        assert_eq!(
            config.control_addr().unwrap(),
            "127.0.0.1:2121".parse().unwrap()
        );
    }

    #[test]
    fn test_invalid_host_is_error() {
        let config = Config {
            host: "not a host".into(),
            ..Config::default()
        };
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "127.0.0.1"
            port = 9000

            [control]
            port = 9001

            [presence]
            tick_interval_ms = 250
            message_template = "{users} online"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.control.port, 9001);
        assert_eq!(config.control.host, "127.0.0.1");
        assert_eq!(config.presence.tick_interval_ms, 250);
        assert_eq!(config.presence.message_template, "{users} online");
        assert_eq!(config.transport.websocket_path, "/ws");
    }

    #[test]
    fn test_from_file() {
        let dir = std::env::temp_dir().join(format!("beacon-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("beacon.toml");
        std::fs::write(&path, "port = 7000\n[qr]\nsize = 120\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.qr.size, 120);
        assert_eq!(config.qr.padding, 10);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_tick() {
        let mut config = Config::default();
        config.presence.tick_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_error_correction() {
        let mut config = Config::default();
        config.qr.error_correction = "extreme".into();
        assert!(config.validate().is_err());
    }
}
