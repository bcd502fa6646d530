//! Following a growing file
//!
//! Each cycle compares the file's size with the size seen on the previous
//! cycle. A smaller size means the file was truncated or replaced, and it is
//! read again from the start; otherwise only the new bytes are read. A
//! rotation that leaves the file at least as large as before is not
//! detected.

use std::collections::VecDeque;
use std::io::{Read, SeekFrom};
use std::time::Duration;

use crate::backend::{Backend, FileHandle, LineBuffer, OpenMode};
use crate::error::HostResult;

/// Something whose size can be polled and whose bytes can be read by range
pub trait TailSource {
    /// Current size in bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be read.
    fn size(&mut self) -> HostResult<u64>;

    /// Reads `len` bytes starting at `offset`
    ///
    /// # Errors
    ///
    /// Returns an error if the range cannot be read.
    fn read_range(&mut self, offset: u64, len: u64) -> HostResult<Vec<u8>>;
}

fn read_handle_range(handle: &mut dyn FileHandle, offset: u64, len: u64) -> HostResult<Vec<u8>> {
    handle.seek(SeekFrom::Start(offset))?;
    let mut data = Vec::new();
    handle.take(len).read_to_end(&mut data)?;
    Ok(data)
}

/// An open file handle
pub struct HandleSource {
    handle: Box<dyn FileHandle>,
}

impl HandleSource {
    /// Follows `handle`
    #[must_use]
    pub fn new(handle: Box<dyn FileHandle>) -> Self {
        Self { handle }
    }
}

impl TailSource for HandleSource {
    fn size(&mut self) -> HostResult<u64> {
        self.handle.size()
    }

    fn read_range(&mut self, offset: u64, len: u64) -> HostResult<Vec<u8>> {
        read_handle_range(self.handle.as_mut(), offset, len)
    }
}

/// A path reopened through a backend on every cycle
///
/// Reopening sees a file that was replaced by a new one, not only one that
/// was truncated in place.
pub struct PathSource<'a> {
    backend: &'a mut dyn Backend,
    path: String,
    current: Option<Box<dyn FileHandle>>,
}

impl<'a> PathSource<'a> {
    /// Follows `path` on `backend`
    pub fn new(backend: &'a mut dyn Backend, path: impl Into<String>) -> Self {
        Self {
            backend,
            path: path.into(),
            current: None,
        }
    }
}

impl TailSource for PathSource<'_> {
    fn size(&mut self) -> HostResult<u64> {
        let mut handle = self.backend.open(&self.path, OpenMode::Read)?;
        let size = handle.size()?;
        self.current = Some(handle);
        Ok(size)
    }

    fn read_range(&mut self, offset: u64, len: u64) -> HostResult<Vec<u8>> {
        let mut handle = match self.current.take() {
            Some(handle) => handle,
            None => self.backend.open(&self.path, OpenMode::Read)?,
        };
        read_handle_range(handle.as_mut(), offset, len)
    }
}

/// Infinite iterator over lines appended to a file
///
/// The first cycle runs immediately; every later cycle waits `interval`
/// first. Errors are yielded and the next call retries.
pub struct TailFollower<S: TailSource> {
    source: S,
    interval: Duration,
    last_size: u64,
    from_end: bool,
    started: bool,
    lines: LineBuffer,
    pending: VecDeque<String>,
}

impl<S: TailSource> TailFollower<S> {
    /// Follows `source` from its first byte
    pub fn new(source: S, interval: Duration) -> Self {
        Self {
            source,
            interval,
            last_size: 0,
            from_end: false,
            started: false,
            lines: LineBuffer::new(),
            pending: VecDeque::new(),
        }
    }

    /// Starts at the current end of the file instead of its first byte
    #[must_use]
    pub const fn skip_existing(mut self) -> Self {
        self.from_end = true;
        self
    }

    /// Size observed on the last cycle
    pub const fn last_size(&self) -> u64 {
        self.last_size
    }

    fn cycle(&mut self) -> HostResult<()> {
        let current = self.source.size()?;
        if self.from_end {
            self.from_end = false;
            self.last_size = current;
            return Ok(());
        }

        let data = if current < self.last_size {
            tracing::debug!(
                previous = self.last_size,
                current,
                "File shrank, reading from the start"
            );
            self.lines.clear();
            self.source.read_range(0, current)?
        } else if current > self.last_size {
            self.source
                .read_range(self.last_size, current - self.last_size)?
        } else {
            Vec::new()
        };

        self.pending.extend(self.lines.push(&data));
        self.last_size = current;
        Ok(())
    }
}

impl<S: TailSource> Iterator for TailFollower<S> {
    type Item = HostResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Some(Ok(line));
            }
            if self.started {
                std::thread::sleep(self.interval);
            }
            self.started = true;
            if let Err(err) = self.cycle() {
                return Some(Err(err));
            }
        }
    }
}

/// Follows `source`, checking every `interval`
pub fn follow<S: TailSource>(source: S, interval: Duration) -> TailFollower<S> {
    TailFollower::new(source, interval)
}
