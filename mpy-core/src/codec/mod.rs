//! Payload codecs: transcript extraction, Python literal encoding and
//! base64.
//!
//! Raw-mode transcripts look like `OK<stdout>\x04<stderr>\x04>`. The
//! device runtime owns that framing; the helpers here only slice it.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::MpyError;

const OK: &str = "OK";
const EOF: char = '\x04';

/// Returns the text strictly between the first `OK` and the first EOF
/// byte of a raw-mode transcript.
///
/// Empty when either marker is missing.
pub fn extract(out: &str) -> &str {
    let (Some(ok), Some(end)) = (out.find(OK), out.find(EOF)) else {
        return "";
    };
    let start = ok + OK.len();
    if end < start {
        return "";
    }
    &out[start..end]
}

/// Stdout and stderr sections of one raw-mode execution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transcript {
    /// Everything printed by the executed code.
    pub stdout: String,
    /// Traceback text, empty when the code finished cleanly.
    pub stderr: String,
}

impl Transcript {
    /// Split a raw transcript into its stdout and stderr sections.
    pub fn parse(out: &str) -> Self {
        let stdout = extract(out).to_string();
        let stderr = out
            .find(OK)
            .and_then(|ok| {
                let rest = &out[ok + OK.len()..];
                let first = rest.find(EOF)?;
                let tail = &rest[first + 1..];
                let second = tail.find(EOF)?;
                Some(tail[..second].to_string())
            })
            .unwrap_or_default();
        Self { stdout, stderr }
    }

    /// Whether the device reported an exception.
    pub fn is_error(&self) -> bool {
        !self.stderr.trim().is_empty()
    }
}

// ── Python literals ──────────────────────────────────────────────

/// Encode `s` as a single-quoted Python string literal.
///
/// Quotes, backslashes and control characters are escaped so that a
/// caller-supplied path can never break out of the literal or inject a
/// control byte into the command stream.
pub fn py_str(s: &str) -> String {
    let mut lit = String::with_capacity(s.len() + 2);
    lit.push('\'');
    for c in s.chars() {
        match c {
            '\\' => lit.push_str("\\\\"),
            '\'' => lit.push_str("\\'"),
            '\n' => lit.push_str("\\n"),
            '\r' => lit.push_str("\\r"),
            '\t' => lit.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                lit.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => lit.push(c),
        }
    }
    lit.push('\'');
    lit
}

/// Encode raw bytes as a `bytes([..])` constructor call.
pub fn py_bytes(data: &[u8]) -> String {
    let list = data
        .iter()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("bytes([{list}])")
}

// ── Base64 ───────────────────────────────────────────────────────

/// Standard-alphabet base64 with `=` padding.
pub fn base64_encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode standard-alphabet base64, ignoring surrounding whitespace.
pub fn base64_decode(text: &str) -> Result<Vec<u8>, MpyError> {
    Ok(STANDARD.decode(text.trim())?)
}
