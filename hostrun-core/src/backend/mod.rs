//! Execution backends
//!
//! A backend runs an already formatted command line in one of three modes
//! (batch, interactive, streaming) and opens files on its host. The local
//! backend spawns `/bin/sh`; the remote backend lives in [`crate::remote`].

pub mod local;

use std::borrow::Cow;
use std::fmt;
use std::io::{Read, Seek, Write};
use std::str::FromStr;

use crate::controls::{Controls, Decode};
use crate::error::{HostError, HostResult};

pub use local::LocalBackend;

/// Captured output of a batch execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Decoded as UTF-8, invalid sequences replaced with U+FFFD
    Text(String),
    /// Raw bytes, when the `decode` control is empty
    Bytes(Vec<u8>),
}

impl Output {
    /// Wraps captured bytes according to `decode`
    #[must_use]
    pub fn decode(bytes: Vec<u8>, decode: Decode) -> Self {
        match decode {
            Decode::Utf8 => match String::from_utf8(bytes) {
                Ok(text) => Self::Text(text),
                Err(err) => Self::Text(String::from_utf8_lossy(err.as_bytes()).into_owned()),
            },
            Decode::Raw => Self::Bytes(bytes),
        }
    }

    /// Empty output in the shape selected by `decode`
    #[must_use]
    pub fn empty(decode: Decode) -> Self {
        Self::decode(Vec::new(), decode)
    }

    /// Underlying bytes
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }

    /// Text view, decoding raw bytes lossily
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            Self::Text(text) => Cow::Borrowed(text),
            Self::Bytes(bytes) => String::from_utf8_lossy(bytes),
        }
    }

    /// Lines of the text view without terminators
    pub fn lines(&self) -> Vec<String> {
        self.text().lines().map(str::to_string).collect()
    }

    /// Returns true when nothing was captured
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text())
    }
}

/// Result of a batch execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// True when the exit status is 0
    pub success: bool,
    /// Captured standard output
    pub stdout: Output,
    /// Captured standard error
    pub stderr: Output,
    /// Exit status, -1 when the command never ran or the status is unknown
    pub exit_code: i32,
}

impl ExecutionResult {
    /// Builds a result from an exit code and captured streams
    #[must_use]
    pub fn from_exit(exit_code: i32, stdout: Vec<u8>, stderr: Vec<u8>, decode: Decode) -> Self {
        Self {
            success: exit_code == 0,
            stdout: Output::decode(stdout, decode),
            stderr: Output::decode(stderr, decode),
            exit_code,
        }
    }

    /// Failed result carrying the reason the command could not start
    #[must_use]
    pub fn spawn_failure(reason: &str, decode: Decode) -> Self {
        Self {
            success: false,
            stdout: Output::empty(decode),
            stderr: Output::decode(reason.as_bytes().to_vec(), decode),
            exit_code: -1,
        }
    }
}

/// One item of a streaming execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    /// A line of standard output, without terminator
    Stdout(String),
    /// A line of standard error, without terminator
    Stderr(String),
    /// Final status, always the last chunk
    Status {
        /// True when the exit status is 0
        success: bool,
        /// Exit status, -1 when unknown
        exit_code: i32,
    },
}

impl StreamChunk {
    /// Status chunk for `exit_code`
    #[must_use]
    pub const fn status(exit_code: i32) -> Self {
        Self::Status {
            success: exit_code == 0,
            exit_code,
        }
    }
}

/// Lazy, finite sequence of chunks produced by a streaming execution
///
/// Dropping it releases the underlying process or channel.
pub type ChunkStream = Box<dyn Iterator<Item = HostResult<StreamChunk>> + Send>;

/// Per-call execution settings taken from the controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecContext {
    /// Decoding of captured output
    pub decode: Decode,
    /// Deadline in seconds, 0 = none
    pub timeout: u64,
}

impl From<&Controls> for ExecContext {
    fn from(controls: &Controls) -> Self {
        Self {
            decode: controls.decode,
            timeout: controls.timeout,
        }
    }
}

/// How a file is opened
///
/// Text and binary modes are the same: handles always carry bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// `r`
    #[default]
    Read,
    /// `w`: create or truncate
    Write,
    /// `a`: create, write at end
    Append,
    /// `r+`: read and write an existing file
    ReadWrite,
}

impl FromStr for OpenMode {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mode: String = s.chars().filter(|c| !matches!(c, 'b' | 't')).collect();
        match mode.as_str() {
            "r" => Ok(Self::Read),
            "w" => Ok(Self::Write),
            "a" => Ok(Self::Append),
            "r+" => Ok(Self::ReadWrite),
            _ => Err(HostError::Config(format!("invalid open mode '{s}'"))),
        }
    }
}

/// Open file on a host
pub trait FileHandle: Read + Write + Seek + Send {
    /// Current size in bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be stat'ed.
    fn size(&mut self) -> HostResult<u64>;
}

/// A place commands run
pub trait Backend: Send {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Runs `line` to completion and captures its output
    ///
    /// # Errors
    ///
    /// Returns `HostError::Timeout` when the deadline passes and connection
    /// errors for remote backends. A non-zero exit is not an error.
    fn execute(&mut self, line: &str, ctx: &ExecContext) -> HostResult<ExecutionResult>;

    /// Runs `line` attached to the terminal and returns its exit code
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be started or the deadline
    /// passes.
    fn interactive(&mut self, line: &str, ctx: &ExecContext) -> HostResult<i32>;

    /// Starts `line` and yields its output line by line
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be started.
    fn stream(&mut self, line: &str, ctx: &ExecContext) -> HostResult<ChunkStream>;

    /// Opens `path` on the host
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    fn open(&mut self, path: &str, mode: OpenMode) -> HostResult<Box<dyn FileHandle>>;

    /// Fails with `HostError::NotConnected` when the backend cannot run commands
    ///
    /// # Errors
    ///
    /// Returns `HostError::NotConnected` for a closed remote session.
    fn is_connected(&self) -> HostResult<()>;

    /// Returns a backend sharing the same underlying session
    ///
    /// # Errors
    ///
    /// Returns `HostError::NotConnected` for a closed remote session.
    fn try_clone(&self) -> HostResult<Box<dyn Backend>>;

    /// Closes the underlying session
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be closed cleanly.
    fn disconnect(&mut self) -> HostResult<()>;
}

/// Splits a byte stream into lines
///
/// A trailing partial line is held until its terminator arrives or the
/// stream ends.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    partial: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feeds bytes and returns every completed line
    pub(crate) fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(data);
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.partial[start..].iter().position(|&b| b == b'\n') {
            let end = start + pos;
            lines.push(line_text(&self.partial[start..end]));
            start = end + 1;
        }
        self.partial.drain(..start);
        lines
    }

    /// Returns the held partial line, if any
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            None
        } else {
            let rest = std::mem::take(&mut self.partial);
            Some(line_text(&rest))
        }
    }

    /// Discards the held partial line
    pub(crate) fn clear(&mut self) {
        self.partial.clear();
    }
}

fn line_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
