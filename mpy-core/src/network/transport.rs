//! Byte-stream transports.
//!
//! The engine only needs an open/read/write/close contract. Opening
//! yields a [`TransportHandle`] holding independent reader and writer
//! halves; closing is shutting the writer down and dropping both.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::PortConfig;
use crate::error::{MpyError, Result};

pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Reader and writer halves of an open transport.
pub struct TransportHandle {
    pub reader: BoxReader,
    pub writer: BoxWriter,
}

impl TransportHandle {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Split a single bidirectional stream into a handle.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer)
    }
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandle").finish_non_exhaustive()
    }
}

/// Something that can be opened into a byte stream to a board.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the link. Fails with [`MpyError::Connection`].
    async fn open(&self, config: &PortConfig) -> Result<TransportHandle>;

    /// Human-readable name for logs.
    fn describe(&self) -> String;
}

// ── TCP bridge ───────────────────────────────────────────────────

/// A board exposed through a raw TCP serial bridge (ser2net, esp-link,
/// simulators).
#[derive(Debug, Clone)]
pub struct TcpTransport {
    address: String,
}

impl TcpTransport {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&self, config: &PortConfig) -> Result<TransportHandle> {
        debug!(
            address = %self.address,
            baud = config.baud_rate,
            "opening tcp bridge (line rate is set on the bridge)"
        );
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| MpyError::Connection(format!("{}: {e}", self.address)))?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(TransportHandle::new(reader, writer))
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.address)
    }
}

// ── Character device ─────────────────────────────────────────────

/// A serial character device such as `/dev/ttyACM0`.
///
/// Line settings are not touched; configure them beforehand (USB CDC
/// boards ignore the baud rate anyway). The device is opened
/// non-blocking and polled through the reactor; no read outlives the
/// dropped reader.
#[derive(Debug, Clone)]
pub struct DeviceFileTransport {
    path: PathBuf,
}

impl DeviceFileTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Transport for DeviceFileTransport {
    async fn open(&self, config: &PortConfig) -> Result<TransportHandle> {
        debug!(path = %self.path.display(), baud = config.baud_rate, "opening device");
        let stream = open_tty(&self.path)
            .map_err(|e| MpyError::Connection(format!("{}: {e}", self.path.display())))?;
        Ok(TransportHandle::from_stream(stream))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(unix)]
fn open_tty(path: &std::path::Path) -> std::io::Result<tty::TtyStream> {
    tty::TtyStream::open(path)
}

#[cfg(not(unix))]
fn open_tty(_path: &std::path::Path) -> std::io::Result<tokio::io::DuplexStream> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "character devices need a unix host; use a tcp bridge",
    ))
}

#[cfg(unix)]
mod tty {
    use std::fs::{File, OpenOptions};
    use std::io::{self, Read, Write};
    use std::os::unix::fs::OpenOptionsExt;
    use std::path::Path;
    use std::pin::Pin;
    use std::task::{Context, Poll, ready};

    use tokio::io::unix::AsyncFd;
    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

    /// A non-blocking character device registered with the reactor.
    pub struct TtyStream {
        inner: AsyncFd<File>,
    }

    impl TtyStream {
        pub fn open(path: &Path) -> io::Result<Self> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
                .open(path)?;
            Ok(Self {
                inner: AsyncFd::new(file)?,
            })
        }
    }

    impl AsyncRead for TtyStream {
        fn poll_read(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            loop {
                let mut guard = ready!(self.inner.poll_read_ready(cx))?;
                let unfilled = buf.initialize_unfilled();
                match guard.try_io(|fd| (&mut fd.get_ref()).read(unfilled)) {
                    Ok(Ok(n)) => {
                        buf.advance(n);
                        return Poll::Ready(Ok(()));
                    }
                    Ok(Err(e)) => return Poll::Ready(Err(e)),
                    Err(_would_block) => continue,
                }
            }
        }
    }

    impl AsyncWrite for TtyStream {
        fn poll_write(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            loop {
                let mut guard = ready!(self.inner.poll_write_ready(cx))?;
                match guard.try_io(|fd| (&mut fd.get_ref()).write(buf)) {
                    Ok(result) => return Poll::Ready(result),
                    Err(_would_block) => continue,
                }
            }
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }
}

// ── Pre-opened stream ────────────────────────────────────────────

/// Wraps one already-connected stream. It can be opened exactly once;
/// later opens fail as if no device had been selected.
pub struct StreamTransport<S> {
    stream: Mutex<Option<S>>,
}

impl<S> StreamTransport<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: Mutex::new(Some(stream)),
        }
    }
}

impl<S> fmt::Debug for StreamTransport<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn open(&self, _config: &PortConfig) -> Result<TransportHandle> {
        let stream = self
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| MpyError::Connection("no device selected".into()))?;
        Ok(TransportHandle::from_stream(stream))
    }

    fn describe(&self) -> String {
        "stream".into()
    }
}
