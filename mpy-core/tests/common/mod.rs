//! A simulated MicroPython board speaking the raw REPL, plus a
//! recording wrapper for the host side of the link.
//!
//! The board understands exactly the command shapes the engine emits
//! and keeps an in-memory filesystem.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use mpy_core::codec::base64_encode;
use mpy_core::{Device, DeviceConfig, StreamTransport};
use serde_json::json;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::time::Instant;

pub const BANNER: &[u8] =
    b"\r\nMicroPython v1.22.0 on 2024-01-01; fake board\r\nType \"help()\" for more information.\r\n>>> ";
const RAW_BANNER: &[u8] = b"raw REPL; CTRL-B to exit\r\n>";
const INTERRUPTED: &[u8] =
    b"\x04Traceback (most recent call last):\r\n  File \"<stdin>\", line 1, in <module>\r\nKeyboardInterrupt: \r\n\x04>";

// ── Board state ──────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct BoardState {
    pub files: BTreeMap<String, Vec<u8>>,
    pub folders: BTreeSet<String>,
    pub helper_loaded: bool,
    pub soft_resets: usize,
    open_file: Option<(String, Vec<u8>)>,
}

pub type SharedBoard = Arc<Mutex<BoardState>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Friendly,
    Raw,
    /// Running a program that only an interrupt stops.
    Stalled,
}

#[derive(Debug, Default)]
struct Output {
    stdout: String,
    stderr: String,
    stall: bool,
}

impl Output {
    fn out(text: impl Into<String>) -> Self {
        Self {
            stdout: text.into(),
            ..Self::default()
        }
    }

    fn err(exception: &str) -> Self {
        Self {
            stderr: format!(
                "Traceback (most recent call last):\r\n  File \"<stdin>\", line 1, in <module>\r\n{exception}\r\n"
            ),
            ..Self::default()
        }
    }
}

/// Serve the raw REPL on `stream` until the host goes away.
pub async fn serve<S>(mut stream: S, board: SharedBoard)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut mode = Mode::Friendly;
    let mut code: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let mut reply = Vec::new();
        for &byte in &buf[..n] {
            match (mode, byte) {
                (Mode::Stalled, 0x03) => {
                    reply.extend_from_slice(INTERRUPTED);
                    mode = Mode::Raw;
                }
                (Mode::Stalled, _) => {}
                (_, 0x01) => {
                    mode = Mode::Raw;
                    code.clear();
                    reply.extend_from_slice(RAW_BANNER);
                }
                (_, 0x02) => {
                    mode = Mode::Friendly;
                    code.clear();
                    reply.extend_from_slice(BANNER);
                }
                (_, 0x03) => code.clear(),
                (Mode::Raw, 0x04) => {
                    let text = String::from_utf8_lossy(&code).into_owned();
                    code.clear();
                    let output = execute(&text, &mut board.lock().unwrap());
                    reply.extend_from_slice(b"OK");
                    if output.stall {
                        mode = Mode::Stalled;
                    } else {
                        reply.extend_from_slice(output.stdout.as_bytes());
                        reply.push(0x04);
                        reply.extend_from_slice(output.stderr.as_bytes());
                        reply.extend_from_slice(b"\x04>");
                    }
                }
                (Mode::Friendly, 0x04) => {
                    let mut state = board.lock().unwrap();
                    state.helper_loaded = false;
                    state.soft_resets += 1;
                    reply.extend_from_slice(b"MPY: soft reboot");
                    reply.extend_from_slice(BANNER);
                }
                (Mode::Raw, b) => code.push(b),
                (Mode::Friendly, _) => {}
            }
        }
        if !reply.is_empty() && stream.write_all(&reply).await.is_err() {
            break;
        }
    }
}

// ── Command interpreter ──────────────────────────────────────────

/// Parse a single-quoted literal at the start of `s`.
fn literal(s: &str) -> Option<(String, &str)> {
    let mut chars = s.char_indices();
    if chars.next()?.1 != '\'' {
        return None;
    }
    let mut out = String::new();
    while let Some((i, c)) = chars.next() {
        match c {
            '\'' => return Some((out, &s[i + 1..])),
            '\\' => match chars.next()?.1 {
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                't' => out.push('\t'),
                'x' => {
                    let hi = chars.next()?.1;
                    let lo = chars.next()?.1;
                    let code = u32::from_str_radix(&format!("{hi}{lo}"), 16).ok()?;
                    out.push(char::from_u32(code)?);
                }
                other => out.push(other),
            },
            c => out.push(c),
        }
    }
    None
}

fn literal_after<'a>(code: &'a str, prefix: &str) -> Option<(String, &'a str)> {
    let at = code.find(prefix)? + prefix.len();
    literal(&code[at..])
}

fn byte_list(code: &str) -> Option<Vec<u8>> {
    let start = code.find('[')? + 1;
    let end = code.rfind(']')?;
    let list = &code[start..end];
    if list.is_empty() {
        return Some(Vec::new());
    }
    list.split(',').map(|n| n.trim().parse().ok()).collect()
}

fn enoent() -> Output {
    Output::err("OSError: [Errno 2] ENOENT")
}

fn execute(code: &str, board: &mut BoardState) -> Output {
    if code.is_empty() {
        return Output::default();
    }
    if code.contains("def b2a_base64(") {
        board.helper_loaded = true;
        return Output::default();
    }

    if code.starts_with("f=open(") && code.ends_with(",'wb')\nw=f.write") {
        let Some((path, _)) = literal_after(code, "f=open(") else {
            return Output::err("SyntaxError: invalid syntax");
        };
        board.open_file = Some((path, Vec::new()));
        return Output::default();
    }
    if code.starts_with("w(bytes([") {
        let Some(bytes) = byte_list(code) else {
            return Output::err("SyntaxError: invalid syntax");
        };
        return match board.open_file.as_mut() {
            Some((_, content)) => {
                content.extend_from_slice(&bytes);
                Output::default()
            }
            None => Output::err("NameError: name 'w' isn't defined"),
        };
    }
    if code == "f.close()" {
        if let Some((path, content)) = board.open_file.take() {
            board.files.insert(path, content);
        }
        return Output::default();
    }
    if code.starts_with("f=open(") && code.ends_with(", 'w');f.close()") {
        if let Some((path, _)) = literal_after(code, "f=open(") {
            board.files.entry(path).or_default();
        }
        return Output::default();
    }

    let needs_helper = code.contains("get_all_files(")
        || code.contains("b2a_base64(")
        || code.starts_with("delete_folder(");
    if needs_helper && !board.helper_loaded {
        return Output::err("NameError: name 'get_all_files' isn't defined");
    }

    if code.contains("json.dumps(get_all_files(''))") {
        let mut entries: Vec<_> = board
            .folders
            .iter()
            .map(|p| json!({"path": p, "type": "folder"}))
            .collect();
        entries.extend(
            board
                .files
                .keys()
                .map(|p| json!({"path": p, "type": "file"})),
        );
        return Output::out(format!("{}\r\n", serde_json::Value::Array(entries)));
    }
    if code.starts_with("with open(") && code.contains("'rb')") {
        let Some((path, _)) = literal_after(code, "with open(") else {
            return Output::err("SyntaxError: invalid syntax");
        };
        return match board.files.get(&path) {
            Some(content) => Output::out(base64_encode(content)),
            None => enoent(),
        };
    }
    if code.starts_with("with open(") && code.contains("'r')") {
        let Some((path, _)) = literal_after(code, "with open(") else {
            return Output::err("SyntaxError: invalid syntax");
        };
        return match board.files.get(&path) {
            Some(content) => Output::out(String::from_utf8_lossy(content).into_owned()),
            None => enoent(),
        };
    }
    if code.starts_with("import os;os.mkdir(") {
        if let Some((path, _)) = literal_after(code, "os.mkdir(") {
            if board.folders.contains(&path) || board.files.contains_key(&path) {
                return Output::err("OSError: [Errno 17] EEXIST");
            }
            board.folders.insert(path);
        }
        return Output::default();
    }
    if code.starts_with("import os;os.rename(") {
        let Some((old, rest)) = literal_after(code, "os.rename(") else {
            return Output::err("SyntaxError: invalid syntax");
        };
        let Some((new, _)) = rest.strip_prefix(',').and_then(literal) else {
            return Output::err("SyntaxError: invalid syntax");
        };
        return rename(board, &old, &new);
    }
    if code.contains("os.remove(") {
        let Some((path, _)) = literal_after(code, "os.remove(") else {
            return Output::err("SyntaxError: invalid syntax");
        };
        return match board.files.remove(&path) {
            Some(_) => Output::default(),
            None => Output::out("0\r\n"),
        };
    }
    if code.starts_with("delete_folder(") {
        let Some((path, _)) = literal_after(code, "delete_folder(") else {
            return Output::err("SyntaxError: invalid syntax");
        };
        if !board.folders.contains(&path) {
            return enoent();
        }
        let below = format!("{path}/");
        board.files.retain(|p, _| !p.starts_with(&below));
        board
            .folders
            .retain(|p| p != &path && !p.starts_with(&below));
        return Output::default();
    }

    if let Some((text, _)) = literal_after(code, "print(") {
        return Output::out(format!("{text}\r\n"));
    }
    if let Some(rest) = code.strip_prefix("raise ") {
        let name = rest.split('(').next().unwrap_or(rest);
        let message = literal_after(rest, "(").map(|(m, _)| m).unwrap_or_default();
        return Output::err(&format!("{name}: {message}"));
    }
    if code.starts_with("while True") {
        return Output {
            stall: true,
            ..Output::default()
        };
    }
    Output::default()
}

fn rename(board: &mut BoardState, old: &str, new: &str) -> Output {
    if let Some(content) = board.files.remove(old) {
        board.files.insert(new.to_string(), content);
        return Output::default();
    }
    if !board.folders.remove(old) {
        return enoent();
    }
    board.folders.insert(new.to_string());
    let below = format!("{old}/");
    let moved_folders: Vec<String> = board
        .folders
        .iter()
        .filter(|p| p.starts_with(&below))
        .cloned()
        .collect();
    for p in moved_folders {
        board.folders.remove(&p);
        board.folders.insert(format!("{new}/{}", &p[below.len()..]));
    }
    let moved_files: Vec<String> = board
        .files
        .keys()
        .filter(|p| p.starts_with(&below))
        .cloned()
        .collect();
    for p in moved_files {
        if let Some(content) = board.files.remove(&p) {
            board.files.insert(format!("{new}/{}", &p[below.len()..]), content);
        }
    }
    Output::default()
}

// ── Recording host stream ────────────────────────────────────────

pub type WriteLog = Arc<Mutex<Vec<(Instant, Vec<u8>)>>>;

/// Forwards to `inner`, logging every write with its timestamp.
pub struct Recorder<S> {
    inner: S,
    log: WriteLog,
}

impl<S: AsyncRead + Unpin> AsyncRead for Recorder<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Recorder<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            this.log
                .lock()
                .unwrap()
                .push((Instant::now(), buf[..*n].to_vec()));
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

// ── Harness ──────────────────────────────────────────────────────

pub struct Harness {
    pub device: Device,
    pub board: SharedBoard,
    pub writes: WriteLog,
}

impl Harness {
    pub fn take_writes(&self) -> Vec<(Instant, Vec<u8>)> {
        std::mem::take(&mut *self.writes.lock().unwrap())
    }
}

/// A connected device talking to a fresh simulated board.
pub async fn connected(config: DeviceConfig) -> Harness {
    let (host, board_end): (DuplexStream, DuplexStream) = tokio::io::duplex(1 << 20);
    let board = SharedBoard::default();
    tokio::spawn(serve(board_end, board.clone()));

    let writes = WriteLog::default();
    let recorder = Recorder {
        inner: host,
        log: writes.clone(),
    };
    let mut device = Device::new(StreamTransport::new(recorder), config);
    device.connect().await.unwrap();
    Harness {
        device,
        board,
        writes,
    }
}
