//! Filesystem operations and file transfer over the raw REPL.
//!
//! # Upload
//! ```text
//! get_prompt → enter_raw_repl
//! execute_raw  f=open(<path>,'wb')\nw=f.write
//! execute_raw  w(bytes([..]))            (one per 128-byte chunk, progress after each)
//! execute_raw  f.close()
//! exit_raw_repl
//! ```
//!
//! # Download
//! ```text
//! get_prompt → run_helper → enter_raw_repl
//! execute_raw  read, b2a_base64, print char by char
//! exit_raw_repl → extract → base64 text
//! ```
//!
//! Paths are always embedded through [`py_str`]; content always
//! travels as integer lists through [`py_bytes`].

use tracing::{debug, info, warn};

use crate::codec::{Transcript, base64_decode, extract, py_bytes, py_str};
use crate::device::Device;
use crate::error::{MpyError, Result};

/// Characters read per iteration by [`Device::load_file`].
pub const LOAD_CHUNK_SIZE: usize = 256;

/// Sentinel printed by the board when a file to remove does not exist.
pub const NOT_FOUND_SENTINEL: &str = "0";

/// Result of [`Device::remove_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    /// The board raised `OSError` and printed the sentinel.
    NotFound,
}

/// Integer percentage of a transfer, floored.
pub fn progress_percent(done: usize, total: usize) -> usize {
    if total == 0 {
        return 100;
    }
    done * 100 / total
}

fn open_for_write(path: &str) -> String {
    format!("f=open({},'wb')\nw=f.write", py_str(path))
}

fn download_code(path: &str) -> String {
    format!(
        "with open({},'rb') as f:\n  b = b2a_base64(f.read())\n  for i in b:\n    print(chr(i), end='')\n",
        py_str(path)
    )
}

fn load_code(path: &str) -> String {
    format!(
        "with open({},'r') as f:\n while 1:\n  b=f.read({LOAD_CHUNK_SIZE})\n  if not b:break\n  print(b,end='')",
        py_str(path)
    )
}

fn remove_file_code(path: &str) -> String {
    format!(
        "import os\ntry:\n  os.remove({})\nexcept OSError:\n  print({NOT_FOUND_SENTINEL})\n",
        py_str(path)
    )
}

impl Device {
    // ── Upload ───────────────────────────────────────────────────

    /// Write `content` to `path` on the board in chunks.
    ///
    /// `progress` receives `"<pct>%"` after every chunk.
    pub async fn upload_file<P>(&self, path: &str, content: &[u8], mut progress: P) -> Result<()>
    where
        P: FnMut(&str),
    {
        self.get_prompt().await?;
        self.enter_raw_repl().await?;
        self.execute_raw(&open_for_write(path)).await?;

        let total = content.len();
        let mut sent = 0;
        for chunk in content.chunks(self.config().repl.effective_chunk_size()) {
            self.execute_raw(&format!("w({})", py_bytes(chunk))).await?;
            sent += chunk.len();
            progress(&format!("{}%", progress_percent(sent, total)));
        }

        self.execute_raw("f.close()").await?;
        self.exit_raw_repl().await?;
        info!(path, bytes = total, "uploaded");
        Ok(())
    }

    /// [`upload_file`](Self::upload_file) for UTF-8 text.
    pub async fn upload_file_from_str<P>(&self, path: &str, content: &str, progress: P) -> Result<()>
    where
        P: FnMut(&str),
    {
        self.upload_file(path, content.as_bytes(), progress).await
    }

    /// [`upload_file`](Self::upload_file) for base64-encoded content.
    pub async fn upload_file_from_base64<P>(&self, path: &str, base64: &str, progress: P) -> Result<()>
    where
        P: FnMut(&str),
    {
        let content = base64_decode(base64)?;
        self.upload_file(path, &content, progress).await
    }

    /// Upload, read the file back and compare BLAKE3 digests.
    pub async fn upload_file_verified<P>(&self, path: &str, content: &[u8], progress: P) -> Result<()>
    where
        P: FnMut(&str),
    {
        self.upload_file(path, content, progress).await?;
        let readback = self.download_file_bytes(path).await?;
        if blake3::hash(content) != blake3::hash(&readback) {
            warn!(path, sent = content.len(), read = readback.len(), "digest mismatch");
            return Err(MpyError::IntegrityFailed);
        }
        debug!(path, "verified");
        Ok(())
    }

    /// Write text in a single call, without progress reporting.
    pub async fn save_file(&self, path: &str, content: &str) -> Result<()> {
        self.get_prompt().await?;
        self.enter_raw_repl().await?;
        self.execute_raw(&open_for_write(path)).await?;
        self.execute_raw(&format!("w({})", py_bytes(content.as_bytes())))
            .await?;
        self.execute_raw("f.close()").await?;
        self.exit_raw_repl().await?;
        Ok(())
    }

    // ── Download ─────────────────────────────────────────────────

    /// Read `path` as base64 text.
    pub async fn download_file(&self, path: &str) -> Result<String> {
        self.get_prompt().await?;
        self.run_helper().await?;
        self.enter_raw_repl().await?;
        let out = self.execute_raw(&download_code(path)).await?;
        self.exit_raw_repl().await?;

        let transcript = Transcript::parse(&out);
        if transcript.is_error() {
            warn!(path, "download failed on the board: {}", transcript.stderr.trim());
        }
        Ok(extract(&out).to_string())
    }

    /// Read `path` as raw bytes.
    pub async fn download_file_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let encoded = self.download_file(path).await?;
        base64_decode(&encoded)
    }

    /// Read `path` as UTF-8 text.
    pub async fn download_file_to_string(&self, path: &str) -> Result<String> {
        let bytes = self.download_file_bytes(path).await?;
        Ok(String::from_utf8(bytes)?)
    }

    /// Read a text file by printing it in 256-character pieces.
    pub async fn load_file(&self, path: &str) -> Result<String> {
        self.get_prompt().await?;
        self.enter_raw_repl().await?;
        let out = self.execute_raw(&load_code(path)).await?;
        self.exit_raw_repl().await?;
        Ok(extract(&out).to_string())
    }

    // ── Filesystem commands ──────────────────────────────────────

    async fn fs_command(&self, code: &str) -> Result<Transcript> {
        self.get_prompt().await?;
        self.enter_raw_repl().await?;
        let out = self.execute_raw(code).await?;
        self.exit_raw_repl().await?;
        let transcript = Transcript::parse(&out);
        if transcript.is_error() {
            warn!("board reported: {}", transcript.stderr.trim());
        }
        Ok(transcript)
    }

    pub async fn create_file(&self, path: &str) -> Result<()> {
        self.fs_command(&format!("f=open({}, 'w');f.close()", py_str(path)))
            .await?;
        Ok(())
    }

    pub async fn create_folder(&self, path: &str) -> Result<()> {
        self.fs_command(&format!("import os;os.mkdir({})", py_str(path)))
            .await?;
        Ok(())
    }

    pub async fn rename_item(&self, old_path: &str, new_path: &str) -> Result<()> {
        self.fs_command(&format!(
            "import os;os.rename({},{})",
            py_str(old_path),
            py_str(new_path)
        ))
        .await?;
        Ok(())
    }

    /// Remove a file. A missing file is reported in-band, not as an error.
    pub async fn remove_file(&self, path: &str) -> Result<RemoveOutcome> {
        let transcript = self.fs_command(&remove_file_code(path)).await?;
        if transcript.stdout.trim() == NOT_FOUND_SENTINEL {
            Ok(RemoveOutcome::NotFound)
        } else {
            Ok(RemoveOutcome::Removed)
        }
    }

    /// Remove a folder and everything below it.
    pub async fn remove_folder(&self, path: &str) -> Result<()> {
        self.get_prompt().await?;
        self.run_helper().await?;
        self.enter_raw_repl().await?;
        let out = self
            .execute_raw(&format!("delete_folder({})", py_str(path)))
            .await?;
        self.exit_raw_repl().await?;
        let transcript = Transcript::parse(&out);
        if transcript.is_error() {
            warn!(path, "board reported: {}", transcript.stderr.trim());
        }
        Ok(())
    }
}
