//! Engine configuration.
//!
//! Every section is `serde(default)` so a partial TOML table from the
//! CLI config deserializes into a complete value.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default serial line rate of MicroPython boards.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Bytes written per raw-mode chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 128;

/// Pause between raw-mode chunks, in milliseconds.
pub const DEFAULT_CHUNK_DELAY_MS: u64 = 10;

/// Top-level configuration for a [`Device`](crate::Device).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Transport parameters.
    pub port: PortConfig,
    /// Raw REPL throttling and deadlines.
    pub repl: ReplConfig,
}

/// Parameters handed to [`Transport::open`](crate::Transport::open).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// Line rate in baud.
    pub baud_rate: u32,
}

/// Raw REPL settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplConfig {
    /// Maximum bytes per write while submitting code.
    pub chunk_size: usize,
    /// Pause after each chunk so the board's input buffer can drain.
    pub chunk_delay_ms: u64,
    /// Deadline for every awaited marker. `None` waits forever.
    pub read_timeout_ms: Option<u64>,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay_ms: DEFAULT_CHUNK_DELAY_MS,
            read_timeout_ms: None,
        }
    }
}

impl ReplConfig {
    /// Inter-chunk pause as a `Duration`.
    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }

    /// Marker deadline as a `Duration`, if any.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    /// Chunk size clamped to at least one byte.
    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.max(1)
    }
}
