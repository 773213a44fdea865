//! CLI configuration.

use std::path::Path;

use mpy_core::{Device, DeviceConfig, DeviceFileTransport, MpyError, TcpTransport};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the `mpy` client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Where the board is.
    pub connection: ConnectionConfig,
    /// Port and raw REPL tuning.
    pub device: DeviceConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Board location. `address` wins when both are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// TCP serial bridge, `host:port`.
    pub address: String,
    /// Serial character device.
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Used when `RUST_LOG` is unset.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            path: "/dev/ttyUSB0".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl CliConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::debug!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Point at a TCP bridge, dropping any device path.
    pub fn use_address(&mut self, address: String) {
        self.connection.address = address;
        self.connection.path.clear();
    }

    /// Point at a serial device, dropping any TCP address.
    pub fn use_path(&mut self, path: String) {
        self.connection.path = path;
        self.connection.address.clear();
    }

    /// Build an unconnected device for the configured transport.
    pub fn device(&self) -> Result<Device, MpyError> {
        let conn = &self.connection;
        let device = self.device.clone();
        if !conn.address.is_empty() {
            Ok(Device::new(TcpTransport::new(conn.address.clone()), device))
        } else if !conn.path.is_empty() {
            Ok(Device::new(DeviceFileTransport::new(&conn.path), device))
        } else {
            Err(MpyError::Connection("no device selected".into()))
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
