//! Remote execution over SSH channels
//!
//! Every execution opens its own channel and closes it on every exit path.
//! Output is drained in non-blocking mode: both streams are read on each
//! pass so a full stderr window can never stall stdout, and when nothing is
//! buffered the socket is polled for a bounded slice instead of spinning.

use std::collections::VecDeque;
use std::io;
use std::ops::{Deref, DerefMut};
use std::os::fd::BorrowedFd;
use std::sync::Arc;
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

use super::connection::RemoteConnection;
use super::{ExecChannel, Transport};
use crate::backend::local::POLL_SLICE;
use crate::backend::{
    Backend, ChunkStream, ExecContext, ExecutionResult, FileHandle, LineBuffer, OpenMode,
    StreamChunk,
};
use crate::error::{HostError, HostResult};
use crate::terminal::{RawModeGuard, StdTerminal, Terminal};
use crate::timeout::TimeoutGuard;

const READ_CHUNK: usize = 8192;

/// Pause used when a transport has no descriptor to poll
const IDLE_PAUSE: Duration = Duration::from_millis(20);

/// Runs commands on a remote host
pub struct RemoteBackend {
    connection: RemoteConnection,
    terminal: Box<dyn Terminal>,
}

impl RemoteBackend {
    /// Backend over `connection`, attached to the process's terminal
    #[must_use]
    pub fn new(connection: RemoteConnection) -> Self {
        Self::with_terminal(connection, Box::new(StdTerminal::new()))
    }

    /// Backend over `connection` using `terminal` for interactive sessions
    #[must_use]
    pub fn with_terminal(connection: RemoteConnection, terminal: Box<dyn Terminal>) -> Self {
        Self {
            connection,
            terminal,
        }
    }

    /// The underlying connection
    pub const fn connection(&self) -> &RemoteConnection {
        &self.connection
    }

    fn open_exec(&self, transport: &Arc<dyn Transport>, line: &str, pty: bool) -> HostResult<ChannelScope> {
        transport.set_blocking(true);
        let mut channel = ChannelScope::new(transport.open_channel()?, Arc::clone(transport));
        if self.connection.forward_agent() {
            if let Err(err) = channel.request_agent_forwarding() {
                tracing::debug!(%err, "Agent forwarding refused");
            }
        }
        if pty {
            channel.request_pty()?;
        }
        channel.exec(line)?;
        Ok(channel)
    }

    fn run_batch(
        &self,
        transport: &Arc<dyn Transport>,
        line: &str,
        guard: &TimeoutGuard,
    ) -> HostResult<(i32, Vec<u8>, Vec<u8>)> {
        let channel = self.open_exec(transport, line, false)?;
        transport.set_blocking(false);
        let mut pump = ChannelPump::new(channel);
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        loop {
            guard.check()?;
            let step = pump.step(&mut |source, data| match source {
                Source::Stdout => stdout.extend_from_slice(data),
                Source::Stderr => stderr.extend_from_slice(data),
            })?;
            if let Some(code) = step.exit_code {
                return Ok((code, stdout, stderr));
            }
            if !step.progressed {
                wait_readable(transport.poll_fd(), None, guard.clamp(POLL_SLICE))?;
            }
        }
    }

    fn run_interactive(
        &mut self,
        transport: &Arc<dyn Transport>,
        line: &str,
        guard: &TimeoutGuard,
    ) -> HostResult<i32> {
        let channel = self.open_exec(transport, line, true)?;
        let mut term = RawModeGuard::enter(self.terminal.as_mut())?;
        transport.set_blocking(false);
        let mut pump = ChannelPump::new(channel);
        let mut input_open = true;
        let mut input = vec![0u8; READ_CHUNK];

        loop {
            guard.check()?;
            let mut write_error = None;
            let step = pump.step(&mut |_, data| {
                if write_error.is_none() {
                    write_error = term.write_output(data).err();
                }
            })?;
            if let Some(err) = write_error {
                return Err(err.into());
            }
            if let Some(code) = step.exit_code {
                return Ok(code);
            }
            if step.progressed {
                continue;
            }

            let input_ready = {
                let input_fd = if input_open { term.input_fd() } else { None };
                wait_readable(transport.poll_fd(), input_fd, guard.clamp(POLL_SLICE))?
            };
            if input_ready {
                match term.read_input(&mut input) {
                    Ok(0) => {
                        input_open = false;
                        pump.channel.send_eof()?;
                    }
                    Ok(n) => write_all(&mut pump.channel, &input[..n], guard)?,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }
    }
}

impl Backend for RemoteBackend {
    fn name(&self) -> &'static str {
        "ssh"
    }

    fn execute(&mut self, line: &str, ctx: &ExecContext) -> HostResult<ExecutionResult> {
        let transport = self.connection.transport()?;
        let guard = arm_interrupting(ctx.timeout, &transport)?;
        let result = self.run_batch(&transport, line, &guard);
        transport.set_blocking(true);
        guard
            .finish(result)
            .map(|(code, stdout, stderr)| ExecutionResult::from_exit(code, stdout, stderr, ctx.decode))
    }

    fn interactive(&mut self, line: &str, ctx: &ExecContext) -> HostResult<i32> {
        let transport = self.connection.transport()?;
        let guard = arm_interrupting(ctx.timeout, &transport)?;
        let result = self.run_interactive(&transport, line, &guard);
        transport.set_blocking(true);
        guard.finish(result)
    }

    fn stream(&mut self, line: &str, ctx: &ExecContext) -> HostResult<ChunkStream> {
        let transport = self.connection.transport()?;
        let guard = arm_interrupting(ctx.timeout, &transport)?;
        let channel = match self.open_exec(&transport, line, false) {
            Ok(channel) => channel,
            Err(err) => {
                transport.set_blocking(true);
                return guard.finish(Err(err));
            }
        };
        transport.set_blocking(false);
        Ok(Box::new(RemoteStream {
            pump: ChannelPump::new(channel),
            transport,
            guard,
            out_lines: LineBuffer::new(),
            err_lines: LineBuffer::new(),
            pending: VecDeque::new(),
            done: false,
        }))
    }

    fn open(&mut self, path: &str, mode: OpenMode) -> HostResult<Box<dyn FileHandle>> {
        let transport = self.connection.transport()?;
        transport.set_blocking(true);
        transport.open_file(path, mode)
    }

    fn is_connected(&self) -> HostResult<()> {
        self.connection.is_connected()
    }

    fn try_clone(&self) -> HostResult<Box<dyn Backend>> {
        self.connection.is_connected()?;
        Ok(Box::new(Self::new(self.connection.clone())))
    }

    fn disconnect(&mut self) -> HostResult<()> {
        self.connection.disconnect()
    }
}

/// Arms a guard whose expiry shuts down the session socket
fn arm_interrupting(seconds: u64, transport: &Arc<dyn Transport>) -> HostResult<TimeoutGuard> {
    let guard = TimeoutGuard::arm(seconds)?;
    let transport = Arc::clone(transport);
    guard.on_expiry(Box::new(move || transport.interrupt()));
    Ok(guard)
}

/// Waits until the socket or the input descriptor is readable
///
/// Returns true when `input` became readable.
fn wait_readable(
    socket: Option<BorrowedFd<'_>>,
    input: Option<BorrowedFd<'_>>,
    wait: Duration,
) -> HostResult<bool> {
    if socket.is_none() && input.is_none() {
        std::thread::sleep(wait.min(IDLE_PAUSE));
        return Ok(false);
    }
    let mut fds = Vec::with_capacity(2);
    if let Some(fd) = socket {
        fds.push(PollFd::new(fd, PollFlags::POLLIN));
    }
    let input_index = input.map(|fd| {
        fds.push(PollFd::new(fd, PollFlags::POLLIN));
        fds.len() - 1
    });
    let timeout = PollTimeout::from(u16::try_from(wait.as_millis()).unwrap_or(u16::MAX));
    match poll(&mut fds, timeout) {
        Ok(_) => {}
        Err(Errno::EINTR) => return Ok(false),
        Err(err) => return Err(err.into()),
    }
    let ready = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;
    Ok(input_index
        .and_then(|i| fds[i].revents())
        .is_some_and(|r| r.intersects(ready)))
}

/// Writes all of `data` to a non-blocking channel
fn write_all(channel: &mut ChannelScope, mut data: &[u8], guard: &TimeoutGuard) -> HostResult<()> {
    while !data.is_empty() {
        guard.check()?;
        match channel.write_stdin(data) {
            Ok(0) => return Err(HostError::Transport("channel closed while writing".into())),
            Ok(n) => data = &data[n..],
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(guard.clamp(IDLE_PAUSE));
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// A channel that is closed when dropped
struct ChannelScope {
    channel: Box<dyn ExecChannel>,
    transport: Arc<dyn Transport>,
}

impl ChannelScope {
    fn new(channel: Box<dyn ExecChannel>, transport: Arc<dyn Transport>) -> Self {
        Self { channel, transport }
    }
}

impl Deref for ChannelScope {
    type Target = dyn ExecChannel;

    fn deref(&self) -> &Self::Target {
        self.channel.as_ref()
    }
}

impl DerefMut for ChannelScope {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.channel.as_mut()
    }
}

impl Drop for ChannelScope {
    fn drop(&mut self) {
        if !self.transport.is_alive() {
            return;
        }
        self.transport.set_blocking(true);
        if let Err(err) = self.channel.close() {
            tracing::debug!(%err, "Channel close failed");
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Source {
    Stdout,
    Stderr,
}

#[derive(Debug, Default)]
struct Step {
    progressed: bool,
    exit_code: Option<i32>,
}

/// Reads a channel until both streams end and the exit status arrives
struct ChannelPump {
    channel: ChannelScope,
    stdout_eof: bool,
    stderr_eof: bool,
    buf: Vec<u8>,
}

impl ChannelPump {
    fn new(channel: ChannelScope) -> Self {
        Self {
            channel,
            stdout_eof: false,
            stderr_eof: false,
            buf: vec![0u8; READ_CHUNK],
        }
    }

    /// One non-blocking pass over both streams
    fn step(&mut self, sink: &mut dyn FnMut(Source, &[u8])) -> HostResult<Step> {
        let mut step = Step::default();

        if !self.stdout_eof {
            match self.channel.read_stdout(&mut self.buf) {
                Ok(0) => self.stdout_eof = true,
                Ok(n) => {
                    sink(Source::Stdout, &self.buf[..n]);
                    step.progressed = true;
                }
                Err(err) if is_transient(&err) => {}
                Err(err) => return Err(HostError::Transport(format!("stdout read failed: {err}"))),
            }
        }
        if !self.stderr_eof {
            match self.channel.read_stderr(&mut self.buf) {
                Ok(0) => self.stderr_eof = true,
                Ok(n) => {
                    sink(Source::Stderr, &self.buf[..n]);
                    step.progressed = true;
                }
                Err(err) if is_transient(&err) => {}
                Err(err) => return Err(HostError::Transport(format!("stderr read failed: {err}"))),
            }
        }

        if self.stdout_eof && self.stderr_eof {
            step.exit_code = self.channel.exit_status()?;
        }
        Ok(step)
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Streaming execution over a channel
struct RemoteStream {
    pump: ChannelPump,
    transport: Arc<dyn Transport>,
    guard: TimeoutGuard,
    out_lines: LineBuffer,
    err_lines: LineBuffer,
    pending: VecDeque<StreamChunk>,
    done: bool,
}

impl RemoteStream {
    fn advance(&mut self) -> HostResult<()> {
        let out_lines = &mut self.out_lines;
        let err_lines = &mut self.err_lines;
        let pending = &mut self.pending;
        let step = self.pump.step(&mut |source, data| match source {
            Source::Stdout => pending.extend(out_lines.push(data).into_iter().map(StreamChunk::Stdout)),
            Source::Stderr => pending.extend(err_lines.push(data).into_iter().map(StreamChunk::Stderr)),
        })?;

        if self.pump.stdout_eof {
            if let Some(rest) = self.out_lines.finish() {
                self.pending.push_back(StreamChunk::Stdout(rest));
            }
        }
        if self.pump.stderr_eof {
            if let Some(rest) = self.err_lines.finish() {
                self.pending.push_back(StreamChunk::Stderr(rest));
            }
        }
        if let Some(code) = step.exit_code {
            self.pending.push_back(StreamChunk::status(code));
            self.done = true;
            self.transport.set_blocking(true);
        } else if !step.progressed {
            wait_readable(self.transport.poll_fd(), None, self.guard.clamp(POLL_SLICE))?;
        }
        Ok(())
    }
}

impl Iterator for RemoteStream {
    type Item = HostResult<StreamChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                return Some(Ok(chunk));
            }
            if self.done {
                return None;
            }
            let result = match self.guard.check() {
                Ok(()) => self.advance(),
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                self.done = true;
                self.transport.set_blocking(true);
                return Some(Err(err));
            }
        }
    }
}

impl Drop for RemoteStream {
    fn drop(&mut self) {
        if !self.done {
            tracing::debug!("Remote stream dropped early, closing channel");
        }
    }
}
