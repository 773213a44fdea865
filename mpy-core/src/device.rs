//! The host-side handle to one MicroPython board.
//!
//! `Device` owns the transport, the connection phase and, while
//! connected, the [`Session`]. Protocol primitives and file transfers
//! are implemented on it in [`crate::protocol`]; they all take `&self`
//! and must be serialized by the caller.

use tracing::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::error::{MpyError, Result};
use crate::message::{ControlByte, Marker};
use crate::network::{ReadUntil, Session, Transport};
use crate::state::ConnectionPhase;

pub struct Device {
    transport: Box<dyn Transport>,
    config: DeviceConfig,
    phase: ConnectionPhase,
    session: Option<Session>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("transport", &self.transport.describe())
            .field("config", &self.config)
            .field("phase", &self.phase)
            .field("session", &self.session)
            .finish()
    }
}

impl Device {
    pub fn new(transport: impl Transport + 'static, config: DeviceConfig) -> Self {
        Self {
            transport: Box::new(transport),
            config,
            phase: ConnectionPhase::Disconnected,
            session: None,
        }
    }

    // ── Connection management ────────────────────────────────────

    /// Open the transport and start the background reader.
    ///
    /// On failure the device stays disconnected and the error is
    /// always [`MpyError::Connection`].
    pub async fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Err(MpyError::Connection("already connected".into()));
        }
        self.phase.begin_connect()?;

        let handle = match self.transport.open(&self.config.port).await {
            Ok(handle) => handle,
            Err(e) => {
                self.phase.finish_disconnect()?;
                return Err(match e {
                    MpyError::Connection(_) => e,
                    other => MpyError::Connection(other.to_string()),
                });
            }
        };

        self.session = Some(Session::start(handle));
        self.phase.complete_connect()?;
        info!(
            transport = %self.transport.describe(),
            baud = self.config.port.baud_rate,
            "connected"
        );
        Ok(())
    }

    /// Stop the reader, release both halves and close the transport.
    pub async fn disconnect(&mut self) -> Result<()> {
        let mut session = self.session.take().ok_or(MpyError::NotConnected)?;
        let uptime = self.phase.connected_duration();
        self.phase.begin_disconnect()?;

        let result = session.close().await;
        self.phase.finish_disconnect()?;
        match &result {
            Ok(()) => info!(
                transport = %self.transport.describe(),
                ?uptime,
                "disconnected"
            ),
            Err(e) => warn!("error while closing transport: {e}"),
        }
        result
    }

    pub fn is_connected(&self) -> bool {
        self.phase.is_connected()
    }

    pub fn phase(&self) -> &ConnectionPhase {
        &self.phase
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(MpyError::NotConnected)
    }

    // ── Stream access ────────────────────────────────────────────

    /// Write raw bytes to the board without waiting for a reply.
    pub async fn write(&self, data: impl AsRef<[u8]>) -> Result<()> {
        self.session()?.write(data.as_ref()).await
    }

    pub(crate) async fn write_control(&self, control: &[ControlByte]) -> Result<()> {
        debug!(?control, "control");
        let bytes: Vec<u8> = control.iter().map(|c| c.as_byte()).collect();
        self.write(bytes).await
    }

    /// Wait for `token`, honouring the configured read timeout.
    pub async fn read_until(&self, token: &str) -> Result<String> {
        let read = self.session()?.demux().begin(token)?;
        self.await_read(read).await
    }

    /// Send control bytes and wait for the reply marker.
    ///
    /// The read is registered before anything is written so a fast
    /// reply cannot be discarded as out-of-band output.
    pub(crate) async fn transact(&self, control: &[ControlByte], marker: Marker) -> Result<String> {
        let read = self.session()?.demux().begin(marker.as_str())?;
        self.write_control(control).await?;
        self.await_read(read).await
    }

    async fn await_read(&self, read: ReadUntil<'_>) -> Result<String> {
        match self.config.repl.read_timeout() {
            Some(deadline) => read.wait_timeout(deadline).await,
            None => read.wait().await,
        }
    }

    /// Reject the outstanding read, if any. Returns `true` if one was
    /// cancelled.
    pub fn cancel_read(&self, reason: &str) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.demux().cancel(reason))
    }

    pub fn is_read_pending(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.demux().is_pending())
    }
}
