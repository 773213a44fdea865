//! Domain-specific error types for the raw REPL engine.
//!
//! All fallible operations return `Result<T, MpyError>`.
//! Device-side failures that the executed code catches itself are
//! reported in-band and never show up here.

use std::time::Duration;
use thiserror::Error;

/// Alias for `Result<T, MpyError>`.
pub type Result<T> = std::result::Result<T, MpyError>;

/// The canonical error type for the raw REPL engine.
#[derive(Debug, Error)]
pub enum MpyError {
    // ── Connection Errors ────────────────────────────────────────
    /// No device was selected, or the transport failed to open.
    #[error("connection error: {0}")]
    Connection(String),

    /// An operation was issued while no session is open.
    #[error("not connected")]
    NotConnected,

    /// The transport reported an I/O error on write, flush or close.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The background reader stopped while a read was still pending.
    #[error("channel closed")]
    ChannelClosed,

    // ── Read-Until Errors ────────────────────────────────────────
    /// A second read-until was started while one is outstanding.
    #[error("already running \"read until\"")]
    Concurrency,

    /// The pending read was cancelled before its token arrived.
    #[error("read interrupted: {0}")]
    Interrupted(String),

    /// The pending read did not see its token before the deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Decoding Errors ──────────────────────────────────────────
    /// A listing returned by the device was not valid JSON.
    #[error("invalid listing: {0}")]
    Json(#[from] serde_json::Error),

    /// A base64 payload could not be decoded.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// UTF-8 conversion failed.
    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    // ── Device Errors ────────────────────────────────────────────
    /// The executed code raised and the device printed a traceback.
    #[error("device error: {0}")]
    Device(String),

    /// Downloaded content does not match what was uploaded.
    #[error("file integrity check failed")]
    IntegrityFailed,

    /// A local invariant was broken, such as an invalid phase
    /// transition or an empty read-until token.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),
}
