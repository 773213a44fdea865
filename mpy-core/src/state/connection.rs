//! Connection lifecycle of a [`Device`](crate::Device).
//!
//! Models the host-side view of the link with validated transitions
//! that return `Result` instead of panicking. The REPL mode of the
//! board itself is never tracked here; it is verified by markers.

use std::time::Instant;

use crate::error::MpyError;

// ── ConnectionPhase ──────────────────────────────────────────────

/// The current phase of the host's link to a board.
///
/// ```text
///  Disconnected ──► Connecting ──► Connected
///       ▲               │              │
///       │               ▼              ▼
///       └─────────── Disconnecting ◄───┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    /// No open transport. Initial / terminal state.
    #[default]
    Disconnected,

    /// Transport open requested but not yet established.
    Connecting,

    /// Transport open and the reader loop running.
    Connected {
        /// When the connection entered the `Connected` state.
        since: Instant,
    },

    /// Reader stopping and transport closing.
    Disconnecting,
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected { .. } => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

impl ConnectionPhase {
    /// Returns `true` when the transport is open.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Returns `true` when the connection is in a terminal or idle state.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// How long the connection has been in the `Connected` state.
    pub fn connected_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<(), MpyError> {
        match self {
            Self::Disconnected => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(MpyError::ProtocolViolation(
                "cannot connect: not in Disconnected state",
            )),
        }
    }

    /// Transition to `Connected`.
    ///
    /// Valid from: `Connecting`.
    pub fn complete_connect(&mut self) -> Result<(), MpyError> {
        match self {
            Self::Connecting => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(MpyError::ProtocolViolation(
                "cannot complete connect: not in Connecting state",
            )),
        }
    }

    /// Transition to `Disconnecting`.
    ///
    /// Valid from: `Connected`.
    pub fn begin_disconnect(&mut self) -> Result<(), MpyError> {
        match self {
            Self::Connected { .. } => {
                *self = Self::Disconnecting;
                Ok(())
            }
            _ => Err(MpyError::ProtocolViolation(
                "cannot disconnect: not in Connected state",
            )),
        }
    }

    /// Transition to `Disconnected`.
    ///
    /// Valid from: `Disconnecting`, `Connecting` (open failure).
    pub fn finish_disconnect(&mut self) -> Result<(), MpyError> {
        match self {
            Self::Disconnecting | Self::Connecting => {
                *self = Self::Disconnected;
                Ok(())
            }
            _ => Err(MpyError::ProtocolViolation(
                "cannot finish disconnect: not in a disconnectable state",
            )),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
