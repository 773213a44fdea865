//! Raw REPL control bytes and the text markers the device answers with.

use std::fmt;

// ── ControlByte ──────────────────────────────────────────────────

/// Single-byte control codes understood by the MicroPython REPL.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlByte {
    /// CTRL-A: switch the friendly REPL into raw mode.
    EnterRawRepl = 0x01,
    /// CTRL-B: leave raw mode; from the friendly REPL it reprints the banner.
    ExitRawRepl = 0x02,
    /// CTRL-C: interrupt whatever is running.
    Interrupt = 0x03,
    /// CTRL-D: execute the buffered code in raw mode, soft reset otherwise.
    Eof = 0x04,
}

impl ControlByte {
    /// The byte as written on the wire.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ControlByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlByte::EnterRawRepl => write!(f, "CTRL-A"),
            ControlByte::ExitRawRepl => write!(f, "CTRL-B"),
            ControlByte::Interrupt => write!(f, "CTRL-C"),
            ControlByte::Eof => write!(f, "CTRL-D"),
        }
    }
}

// ── Marker ───────────────────────────────────────────────────────

/// Text the device prints when it reaches a known state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// Friendly REPL idle prompt.
    Prompt,
    /// Banner printed after entering raw mode.
    RawBanner,
    /// End of a raw-mode execution: EOF then the raw prompt.
    RawEnd,
}

impl Marker {
    /// The literal token awaited on the stream.
    pub fn as_str(&self) -> &'static str {
        match self {
            Marker::Prompt => ">>>",
            Marker::RawBanner => "raw REPL; CTRL-B to exit",
            Marker::RawEnd => "\x04>",
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}
