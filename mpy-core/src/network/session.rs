use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::codec::{BytesCodec, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::network::demux::Demux;
use crate::network::transport::{BoxReader, BoxWriter, TransportHandle};

/// An open link to a board.
///
/// Owns the writer half and a background task that pulls raw chunks
/// off the reader half and feeds them to the [`Demux`].
pub struct Session {
    writer: Mutex<BoxWriter>,
    demux: Demux,
    reader_task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("demux", &self.demux)
            .field("reader_running", &self.reader_task.is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Take ownership of an open transport and start the reader loop.
    pub fn start(handle: TransportHandle) -> Self {
        let demux = Demux::new();
        let cancel = CancellationToken::new();

        // Reader task: Transport -> Demux
        let reader_task = tokio::spawn(read_loop(handle.reader, demux.clone(), cancel.clone()));

        Self {
            writer: Mutex::new(handle.writer),
            demux,
            reader_task: Some(reader_task),
            cancel,
        }
    }

    /// Write raw bytes and flush. Does not wait for any reply.
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        trace!(len = data.len(), "tx");
        let mut writer = self.writer.lock().await;
        writer.write_all(data).await?;
        writer.flush().await?;
        Ok(())
    }

    pub fn demux(&self) -> &Demux {
        &self.demux
    }

    /// Stop the reader loop and shut the writer down.
    ///
    /// Any pending read fails with `ChannelClosed`.
    pub async fn close(&mut self) -> Result<()> {
        self.cancel.cancel();
        if let Some(task) = self.reader_task.take() {
            if let Err(e) = task.await {
                warn!("reader task ended abnormally: {e}");
            }
        }
        self.demux.close();
        let mut writer = self.writer.lock().await;
        writer.shutdown().await?;
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Pull chunks until end of stream, a read error, or cancellation.
///
/// Read errors are not propagated: the loop simply ends and the next
/// read-until observes `ChannelClosed`.
async fn read_loop(reader: BoxReader, demux: Demux, cancel: CancellationToken) {
    let mut frames = FramedRead::new(reader, BytesCodec::new());
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("reader stopped");
                break;
            }
            next = frames.next() => match next {
                Some(Ok(chunk)) => {
                    trace!(len = chunk.len(), "rx");
                    demux.feed(&chunk);
                }
                Some(Err(e)) => {
                    debug!("read error, stopping reader: {e}");
                    break;
                }
                None => {
                    debug!("end of stream");
                    break;
                }
            }
        }
    }
    demux.close();
}
