//! Endpoint configuration
//!
//! Host frameworks configure adapters through string properties
//! (`host`, `port`, `connect-type`, `id`); applications usually load the same
//! settings from YAML:
//!
//! ```rust
//! use edgestream::{ConnectType, EdgeConfig};
//!
//! let config = EdgeConfig::from_yaml("host: 127.0.0.1\nport: 5000\nconnect-type: TCP\n").unwrap();
//! assert_eq!(config.port, 5000);
//! assert_eq!(config.connect_type, ConnectType::Tcp);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::{EdgeError, Result};

/// Default host for both publisher and subscriber
pub const DEFAULT_HOST: &str = "localhost";
/// Default port for both publisher and subscriber
pub const DEFAULT_PORT: u16 = 3000;
/// Default handle identity
pub const DEFAULT_ID: &str = "edge";

/// Connection type requested when creating a handle.
///
/// Only [`ConnectType::Tcp`] is implemented by the bundled transports. The
/// other values are accepted as configuration and rejected by the transport
/// at create time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectType {
    /// Directly sending stream frames via TCP connections
    #[default]
    Tcp,
    /// Directly sending stream frames via UDP (reserved)
    Udp,
    /// Stream frames through an MQTT broker (reserved)
    Mqtt,
    /// MQTT for discovery, TCP for frames (reserved)
    Hybrid,
}

impl ConnectType {
    /// All connection types, in declaration order.
    pub const ALL: [ConnectType; 4] =
        [ConnectType::Tcp, ConnectType::Udp, ConnectType::Mqtt, ConnectType::Hybrid];

    /// Canonical property string.
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectType::Tcp => "TCP",
            ConnectType::Udp => "UDP",
            ConnectType::Mqtt => "MQTT",
            ConnectType::Hybrid => "HYBRID",
        }
    }

    /// Human readable description, as shown in property listings.
    pub fn description(self) -> &'static str {
        match self {
            ConnectType::Tcp => "Directly sending stream frames via TCP connections.",
            ConnectType::Udp => "Directly sending stream frames via UDP connections.",
            ConnectType::Mqtt => "Connect and send stream frames with MQTT brokers.",
            ConnectType::Hybrid => {
                "Connect with MQTT brokers and directly sending stream frames via TCP connections."
            }
        }
    }

    /// Whether a bundled transport can serve this type.
    pub fn is_supported(self) -> bool {
        matches!(self, ConnectType::Tcp)
    }
}

impl fmt::Display for ConnectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectType {
    type Err = EdgeError;

    fn from_str(s: &str) -> Result<Self> {
        ConnectType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EdgeError::config("connect-type", format!("unknown connection type '{}'", s)))
    }
}

/// Settings shared by the publisher and subscriber adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EdgeConfig {
    /// Identity passed to the transport at create time
    pub id: String,

    /// Publisher: address to listen on. Subscriber: address to connect to.
    pub host: String,

    /// Port matching `host`; 0 lets the transport pick a free port
    pub port: u16,

    /// Transport flavour requested at create time
    pub connect_type: ConnectType,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            id: DEFAULT_ID.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_type: ConnectType::default(),
        }
    }
}

impl EdgeConfig {
    /// Configuration for `host:port` with the remaining fields defaulted.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port, ..Self::default() }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_connect_type(mut self, connect_type: ConnectType) -> Self {
        self.connect_type = connect_type;
        self
    }

    /// Parse a YAML document. Missing keys keep their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: EdgeConfig = serde_yaml_ng::from_str(yaml)
            .map_err(|e| EdgeError::config("YAML configuration", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML configuration file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            EdgeError::config(path.display().to_string(), format!("cannot read file: {}", e))
        })?;
        debug!("Loaded edge configuration from {}", path.display());
        Self::from_yaml(&yaml)
    }

    /// Serialize back to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml_ng::to_string(self)
            .map_err(|e| EdgeError::config("YAML configuration", e.to_string()))
    }

    /// Reject values no transport can use.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(EdgeError::config("host", "host cannot be empty"));
        }
        if self.id.is_empty() {
            return Err(EdgeError::config("id", "id cannot be empty"));
        }
        Ok(())
    }

    /// Set a property by name, the way a host framework does.
    ///
    /// Recognised names are `id`, `host`, `port` and `connect-type`
    /// (`connect_type` is accepted too). An empty host is ignored with a
    /// warning and keeps the previous value.
    pub fn set_property(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "id" => {
                if value.is_empty() {
                    return Err(EdgeError::config("id", "id cannot be empty"));
                }
                self.id = value.to_string();
            }
            "host" => {
                if value.trim().is_empty() {
                    warn!("host property cannot be empty, keeping '{}'", self.host);
                    return Ok(());
                }
                self.host = value.to_string();
            }
            "port" => {
                self.port = value.trim().parse::<u16>().map_err(|_| {
                    EdgeError::config("port", format!("'{}' is not a port between 0 and 65535", value))
                })?;
            }
            "connect-type" | "connect_type" => {
                self.connect_type = value.parse()?;
            }
            other => {
                return Err(EdgeError::config("property", format!("unknown property '{}'", other)));
            }
        }
        debug!(property = name, value, "Property updated");
        Ok(())
    }

    /// Read a property by name as a string.
    pub fn property(&self, name: &str) -> Option<String> {
        match name {
            "id" => Some(self.id.clone()),
            "host" => Some(self.host.clone()),
            "port" => Some(self.port.to_string()),
            "connect-type" | "connect_type" => Some(self.connect_type.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EdgeConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 3000);
        assert_eq!(config.connect_type, ConnectType::Tcp);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn yaml_partial_document_keeps_defaults() {
        let config = EdgeConfig::from_yaml("port: 0\n").unwrap();
        assert_eq!(config.port, 0);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.id, DEFAULT_ID);
    }

    #[test]
    fn yaml_roundtrip() {
        let config = EdgeConfig::new("10.0.0.2", 5000).with_id("camera-0");
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("connect-type: TCP"));
        assert_eq!(EdgeConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn yaml_rejects_bad_values() {
        assert!(EdgeConfig::from_yaml("port: 70000\n").is_err());
        assert!(EdgeConfig::from_yaml("connect-type: CARRIER_PIGEON\n").is_err());
        assert!(EdgeConfig::from_yaml("host: ''\n").is_err());
    }

    #[test]
    fn properties() {
        let mut config = EdgeConfig::default();

        config.set_property("host", "192.168.0.4").unwrap();
        config.set_property("port", "5000").unwrap();
        config.set_property("connect-type", "tcp").unwrap();

        assert_eq!(config.property("host").as_deref(), Some("192.168.0.4"));
        assert_eq!(config.property("port").as_deref(), Some("5000"));
        assert_eq!(config.property("connect-type").as_deref(), Some("TCP"));
        assert_eq!(config.property("bogus"), None);
    }

    #[test]
    fn empty_host_is_ignored() {
        let mut config = EdgeConfig::new("127.0.0.1", 5000);
        config.set_property("host", "").unwrap();
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn invalid_properties_are_rejected() {
        let mut config = EdgeConfig::default();
        assert!(config.set_property("port", "65536").is_err());
        assert!(config.set_property("port", "-1").is_err());
        assert!(config.set_property("connect-type", "SCTP").is_err());
        assert!(config.set_property("latency", "10").is_err());
        assert_eq!(config, EdgeConfig::default());
    }

    #[test]
    fn connect_type_parsing() {
        for t in ConnectType::ALL {
            assert_eq!(t.as_str().parse::<ConnectType>().unwrap(), t);
            assert_eq!(t.as_str().to_lowercase().parse::<ConnectType>().unwrap(), t);
            assert!(!t.description().is_empty());
        }
        assert!(ConnectType::Tcp.is_supported());
        assert!(!ConnectType::Mqtt.is_supported());
    }
}
