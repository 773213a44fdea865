//! Read-until demultiplexer.
//!
//! Turns the unstructured stream of received chunks into discrete
//! completions keyed by a text token. At most one [`PendingRead`]
//! exists at any time; it lives in an `Option` inside the shared state
//! so the invariant is structural rather than a pair of nullable fields.
//!
//! ```text
//! reader task ──feed(chunk)──► Demux ──oneshot──► read_until(token)
//!                                 ▲
//!              cancel(reason) ────┘
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::BytesMut;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{MpyError, Result};

/// The single outstanding "accumulate until token" operation.
#[derive(Debug)]
struct PendingRead {
    /// Distinguishes this read from any later one in the same slot.
    id: u64,
    token: Vec<u8>,
    /// Everything received since the read was registered.
    buffer: BytesMut,
    /// Both resolve and reject go through here.
    tx: oneshot::Sender<Result<String>>,
}

#[derive(Debug, Default)]
struct DemuxState {
    pending: Option<PendingRead>,
    next_id: u64,
    /// Set once the reader task has stopped.
    closed: bool,
}

/// Shared handle to the demultiplexer. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Demux {
    state: Arc<Mutex<DemuxState>>,
}

/// A registered read-until, not yet awaited.
///
/// Registering before writing the request means a reply that arrives
/// before the caller starts awaiting is still accumulated. Dropping it
/// frees the slot.
#[derive(Debug)]
#[must_use = "a registered read does nothing unless awaited"]
pub struct ReadUntil<'a> {
    demux: &'a Demux,
    id: u64,
    rx: Option<oneshot::Receiver<Result<String>>>,
}

impl ReadUntil<'_> {
    /// Wait for the token.
    pub async fn wait(mut self) -> Result<String> {
        let Some(rx) = self.rx.take() else {
            return Err(MpyError::ChannelClosed);
        };
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(MpyError::ChannelClosed),
        }
    }

    /// Wait for the token at most `deadline`.
    pub async fn wait_timeout(self, deadline: Duration) -> Result<String> {
        tokio::time::timeout(deadline, self.wait())
            .await
            .map_err(|_| MpyError::Timeout(deadline))?
    }
}

impl Drop for ReadUntil<'_> {
    fn drop(&mut self) {
        self.demux.clear_if(self.id);
    }
}

impl Demux {
    /// Create an empty demultiplexer.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DemuxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until `token` appears in the received text.
    ///
    /// Resolves with everything received since the call, up to and
    /// including the chunk that completed the token. Fails immediately
    /// with [`MpyError::Concurrency`] if another read is outstanding.
    pub async fn read_until(&self, token: &str) -> Result<String> {
        self.begin(token)?.wait().await
    }

    /// [`read_until`](Self::read_until) with a deadline.
    ///
    /// On expiry the pending read is cleared and
    /// [`MpyError::Timeout`] is returned.
    pub async fn read_until_timeout(&self, token: &str, deadline: Duration) -> Result<String> {
        self.begin(token)?.wait_timeout(deadline).await
    }

    /// Register a read-until now and await it later.
    pub fn begin(&self, token: &str) -> Result<ReadUntil<'_>> {
        if token.is_empty() {
            return Err(MpyError::ProtocolViolation("empty read-until token"));
        }
        let mut state = self.lock();
        if state.closed {
            return Err(MpyError::ChannelClosed);
        }
        if state.pending.is_some() {
            return Err(MpyError::Concurrency);
        }
        let (tx, rx) = oneshot::channel();
        state.next_id += 1;
        let id = state.next_id;
        state.pending = Some(PendingRead {
            id,
            token: token.as_bytes().to_vec(),
            buffer: BytesMut::new(),
            tx,
        });
        trace!(id, token = ?token, "read-until registered");
        Ok(ReadUntil {
            demux: self,
            id,
            rx: Some(rx),
        })
    }

    /// Deliver one received chunk.
    ///
    /// Appended to the pending accumulator if there is one, discarded
    /// otherwise.
    pub fn feed(&self, chunk: &[u8]) {
        let mut state = self.lock();
        let Some(pending) = state.pending.as_mut() else {
            trace!(len = chunk.len(), "discarding out-of-band chunk");
            return;
        };

        // Only the tail that could overlap the new bytes needs rescanning.
        let scan_from = pending
            .buffer
            .len()
            .saturating_sub(pending.token.len().saturating_sub(1));
        pending.buffer.extend_from_slice(chunk);
        if !contains(&pending.buffer[scan_from..], &pending.token) {
            return;
        }

        if let Some(done) = state.pending.take() {
            let text = String::from_utf8_lossy(&done.buffer).into_owned();
            trace!(id = done.id, len = text.len(), "read-until resolved");
            let _ = done.tx.send(Ok(text));
        }
    }

    /// Reject the outstanding read, if any, with `reason`.
    ///
    /// Returns `true` when a read was cancelled.
    pub fn cancel(&self, reason: &str) -> bool {
        match self.lock().pending.take() {
            Some(pending) => {
                debug!(id = pending.id, reason, "read-until cancelled");
                let _ = pending
                    .tx
                    .send(Err(MpyError::Interrupted(reason.to_string())));
                true
            }
            None => false,
        }
    }

    /// Whether a read is outstanding.
    pub fn is_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Mark the stream as finished; the pending read and every later
    /// one fail with [`MpyError::ChannelClosed`].
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        if let Some(pending) = state.pending.take() {
            let _ = pending.tx.send(Err(MpyError::ChannelClosed));
        }
    }

    fn clear_if(&self, id: u64) {
        let mut state = self.lock();
        if state.pending.as_ref().is_some_and(|p| p.id == id) {
            trace!(id, "read-until abandoned");
            state.pending = None;
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[tokio::test]
    async fn resolves_with_everything_up_to_token() {
        let demux = Demux::new();
        let mut read = task::spawn(demux.read_until(">>>"));
        assert_pending!(read.poll());

        demux.feed(b"MicroPython v1.22\r\n");
        assert_pending!(read.poll());
        demux.feed(b">>> ");

        let text = assert_ready!(read.poll()).unwrap();
        assert_eq!(text, "MicroPython v1.22\r\n>>> ");
        assert!(!demux.is_pending());
    }

    #[tokio::test]
    async fn chunk_boundary_independence() {
        let stream = b"noise raw REPL; CTRL-B to exit\r\n>";
        let token = "raw REPL; CTRL-B to exit";

        for split in 1..stream.len() {
            let demux = Demux::new();
            let mut read = task::spawn(demux.read_until(token));
            assert_pending!(read.poll());

            for piece in stream.chunks(split) {
                demux.feed(piece);
            }
            let text = assert_ready!(read.poll()).unwrap();
            assert!(text.contains(token), "split {split}");
            assert!(text.starts_with("noise"));
        }
    }

    #[tokio::test]
    async fn token_split_one_byte_at_a_time() {
        let demux = Demux::new();
        let mut read = task::spawn(demux.read_until("\x04>"));
        assert_pending!(read.poll());
        for b in b"OKhello\x04\x04>" {
            demux.feed(&[*b]);
        }
        let text = assert_ready!(read.poll()).unwrap();
        assert_eq!(text, "OKhello\x04\x04>");
    }

    #[tokio::test]
    async fn multibyte_utf8_split_across_chunks() {
        let demux = Demux::new();
        let mut read = task::spawn(demux.read_until(">>>"));
        assert_pending!(read.poll());
        let bytes = "é>>>".as_bytes();
        demux.feed(&bytes[..1]);
        demux.feed(&bytes[1..]);
        assert_eq!(assert_ready!(read.poll()).unwrap(), "é>>>");
    }

    #[tokio::test]
    async fn second_read_fails_and_first_survives() {
        let demux = Demux::new();
        let mut first = task::spawn(demux.read_until(">>>"));
        assert_pending!(first.poll());

        let second = demux.read_until("other").await;
        assert!(matches!(second, Err(MpyError::Concurrency)));
        assert!(demux.is_pending());

        demux.feed(b">>>");
        assert_eq!(assert_ready!(first.poll()).unwrap(), ">>>");
    }

    #[tokio::test]
    async fn cancel_rejects_pending() {
        let demux = Demux::new();
        let mut read = task::spawn(demux.read_until(">>>"));
        assert_pending!(read.poll());

        assert!(demux.cancel("interrupted to get prompt"));
        let err = assert_ready!(read.poll()).unwrap_err();
        assert!(matches!(err, MpyError::Interrupted(ref r) if r.contains("get prompt")));
        assert!(!demux.cancel("again"));
    }

    #[tokio::test]
    async fn chunks_without_pending_read_are_dropped() {
        let demux = Demux::new();
        demux.feed(b">>> stale");

        let mut read = task::spawn(demux.read_until(">>>"));
        assert_pending!(read.poll());
        demux.feed(b"fresh>>>");
        assert_eq!(assert_ready!(read.poll()).unwrap(), "fresh>>>");
    }

    #[tokio::test]
    async fn dropped_future_frees_the_slot() {
        let demux = Demux::new();
        {
            let mut read = task::spawn(demux.read_until(">>>"));
            assert_pending!(read.poll());
            assert!(demux.is_pending());
        }
        assert!(!demux.is_pending());
    }

    #[tokio::test]
    async fn registered_read_sees_early_reply() {
        let demux = Demux::new();
        let read = demux.begin(">>>").unwrap();
        demux.feed(b"\r\n>>> ");
        assert_eq!(read.wait().await.unwrap(), "\r\n>>> ");
    }

    #[tokio::test]
    async fn unawaited_registration_frees_the_slot() {
        let demux = Demux::new();
        let read = demux.begin(">>>").unwrap();
        assert!(matches!(demux.begin("x"), Err(MpyError::Concurrency)));
        drop(read);
        assert!(demux.begin("x").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_clears_pending() {
        let demux = Demux::new();
        let err = demux
            .read_until_timeout(">>>", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, MpyError::Timeout(_)));
        assert!(!demux.is_pending());
    }

    #[tokio::test]
    async fn close_fails_pending_and_future_reads() {
        let demux = Demux::new();
        let mut read = task::spawn(demux.read_until(">>>"));
        assert_pending!(read.poll());

        demux.close();
        assert!(matches!(
            assert_ready!(read.poll()),
            Err(MpyError::ChannelClosed)
        ));
        assert!(matches!(
            demux.read_until(">>>").await,
            Err(MpyError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn empty_token_rejected() {
        let demux = Demux::new();
        assert!(matches!(
            demux.read_until("").await,
            Err(MpyError::ProtocolViolation(_))
        ));
    }
}
