//! Raw REPL primitives.
//!
//! # Wire Protocol
//!
//! ```text
//! Host  ──[0x03 0x02]────────────────────────► Board   (get prompt)
//! Board ──"...>>>"───────────────────────────► Host
//!
//! Host  ──[0x01]─────────────────────────────► Board   (enter raw)
//! Board ──"raw REPL; CTRL-B to exit\r\n>"────► Host
//!
//! Host  ──code (≤128 B chunks, 10 ms apart)──► Board
//! Host  ──[0x04]─────────────────────────────► Board   (execute)
//! Board ──"OK" stdout 0x04 stderr "\x04>"────► Host
//!
//! Host  ──[0x02]─────────────────────────────► Board   (exit raw)
//! Board ──"...>>>"───────────────────────────► Host
//! ```
//!
//! The board's mode is never stored locally: every transition is
//! confirmed by awaiting its marker. Each primitive is a strictly
//! sequential chain of writes and read-until awaits.

use tracing::{debug, warn};

use crate::codec::Transcript;
use crate::device::Device;
use crate::error::{MpyError, Result};
use crate::message::{ControlByte, Marker};
use crate::protocol::helper::HELPER_CODE;

/// Reason given to a read cancelled by [`Device::get_prompt`].
pub const INTERRUPT_REASON: &str = "interrupted to get prompt";

impl Device {
    /// Force the board back to the friendly REPL prompt.
    ///
    /// Cancels any pending read first, then sends interrupt followed
    /// by a prompt request.
    pub async fn get_prompt(&self) -> Result<()> {
        if self.cancel_read(INTERRUPT_REASON) {
            debug!("cancelled pending read to get prompt");
        }
        self.transact(
            &[ControlByte::Interrupt, ControlByte::ExitRawRepl],
            Marker::Prompt,
        )
        .await?;
        Ok(())
    }

    /// Alias of [`get_prompt`](Self::get_prompt).
    pub async fn stop(&self) -> Result<()> {
        self.get_prompt().await
    }

    pub async fn enter_raw_repl(&self) -> Result<()> {
        self.transact(&[ControlByte::EnterRawRepl], Marker::RawBanner)
            .await?;
        Ok(())
    }

    pub async fn exit_raw_repl(&self) -> Result<()> {
        self.transact(&[ControlByte::ExitRawRepl], Marker::Prompt)
            .await?;
        Ok(())
    }

    /// Submit `code` in raw mode and return the full transcript.
    ///
    /// The code is written in `chunk_size` pieces with a pause after
    /// each so the board's input buffer never overruns, then a single
    /// EOF triggers execution.
    pub async fn execute_raw(&self, code: &str) -> Result<String> {
        let repl = &self.config().repl;
        let delay = repl.chunk_delay();
        for chunk in code.as_bytes().chunks(repl.effective_chunk_size()) {
            self.write(chunk).await?;
            tokio::time::sleep(delay).await;
        }
        let out = self.transact(&[ControlByte::Eof], Marker::RawEnd).await?;
        debug!(code_len = code.len(), out_len = out.len(), "executed");
        Ok(out)
    }

    /// Run `code` from any state and return to the friendly REPL.
    ///
    /// After execution a second EOF is sent and its completion marker
    /// awaited before leaving raw mode.
    pub async fn run(&self, code: &str) -> Result<String> {
        self.get_prompt().await?;
        self.enter_raw_repl().await?;
        let out = self.execute_raw(code).await?;
        self.transact(&[ControlByte::Eof], Marker::RawEnd).await?;
        self.exit_raw_repl().await?;
        Ok(out)
    }

    /// Install the companion script into the board's namespace.
    pub async fn run_helper(&self) -> Result<String> {
        self.get_prompt().await?;
        self.enter_raw_repl().await?;
        let out = self.execute_raw(HELPER_CODE).await?;
        self.exit_raw_repl().await?;
        if Transcript::parse(&out).is_error() {
            warn!("companion script reported an error");
        }
        Ok(out)
    }

    /// Interrupt, then soft reset the board.
    pub async fn soft_reset(&self) -> Result<()> {
        self.get_prompt().await?;
        self.transact(&[ControlByte::Eof], Marker::Prompt).await?;
        Ok(())
    }

    /// Execute `code` and return what it printed.
    ///
    /// Unlike [`run`](Self::run), a traceback printed by the board is
    /// returned as [`MpyError::Device`].
    pub async fn exec(&self, code: &str) -> Result<String> {
        self.get_prompt().await?;
        self.enter_raw_repl().await?;
        let out = self.execute_raw(code).await?;
        self.exit_raw_repl().await?;

        let transcript = Transcript::parse(&out);
        if transcript.is_error() {
            return Err(MpyError::Device(transcript.stderr.trim().to_string()));
        }
        Ok(transcript.stdout)
    }
}
