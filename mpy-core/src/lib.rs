//! # mpy-core
//!
//! Host-side engine for the MicroPython raw REPL.
//!
//! This crate contains:
//! - **Network**: `Transport` implementations, the `Session` with its
//!   background reader, and the read-until `Demux`
//! - **Device**: the connected board handle every operation runs on
//! - **Protocol**: raw REPL primitives, file transfer, filesystem tree
//! - **Codec**: transcript extraction, Python literals, base64
//! - **Config**: `DeviceConfig`, serde-loadable
//! - **State**: the connection phase machine
//! - **Error**: `MpyError`, a typed `thiserror` hierarchy

pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod message;
pub mod network;
pub mod protocol;
pub mod state;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{Transcript, extract, py_bytes, py_str};
pub use config::{DeviceConfig, PortConfig, ReplConfig};
pub use device::Device;
pub use error::{MpyError, Result};
pub use message::{ControlByte, Marker};
pub use network::{
    Demux, DeviceFileTransport, Session, StreamTransport, TcpTransport, Transport,
    TransportHandle,
};
pub use protocol::{EntryKind, FileEntry, FileTreeNode, RemoveOutcome, build_tree, flatten};
pub use state::ConnectionPhase;
