//! Local process backend
//!
//! Every line runs under `/bin/sh -c`. Batch and streaming children get their
//! own process group so a timeout can kill the whole pipeline, not only the
//! shell.

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, ChildStderr, ChildStdout, ExitStatus, Stdio};
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::signal::{Signal, kill, killpg};
use nix::unistd::Pid;

use super::{
    Backend, ChunkStream, ExecContext, ExecutionResult, FileHandle, LineBuffer, OpenMode,
    StreamChunk,
};
use crate::error::{HostError, HostResult};
use crate::timeout::TimeoutGuard;

/// Default interpreter for every command line
pub const SHELL: &str = "/bin/sh";

/// Longest single wait inside the streaming poll loop
pub(crate) const POLL_SLICE: Duration = Duration::from_millis(100);

const READ_CHUNK: usize = 8192;

/// Runs commands on the local machine
#[derive(Debug, Clone)]
pub struct LocalBackend {
    interpreter: PathBuf,
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from(SHELL),
        }
    }
}

impl LocalBackend {
    /// Creates a local backend running lines under `/bin/sh`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs lines under `interpreter -c` instead of `/bin/sh`
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Interpreter every line runs under
    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    fn shell_command(&self, line: &str) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.interpreter);
        cmd.arg("-c").arg(line);
        cmd
    }
}

/// Exit code of a finished child; signals map to 128 + signal number
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

fn child_pid(child: &Child) -> Pid {
    Pid::from_raw(child.id() as i32)
}

fn kill_group(pid: Pid) {
    if let Err(err) = killpg(pid, Signal::SIGKILL) {
        tracing::debug!(pid = pid.as_raw(), %err, "killpg failed");
    }
}

fn kill_child(pid: Pid) {
    if let Err(err) = kill(pid, Signal::SIGKILL) {
        tracing::debug!(pid = pid.as_raw(), %err, "kill failed");
    }
}

fn set_nonblocking(fd: impl AsFd) -> HostResult<()> {
    let flags = OFlag::from_bits_truncate(fcntl(&fd, FcntlArg::F_GETFL)?);
    fcntl(&fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

impl Backend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn execute(&mut self, line: &str, ctx: &ExecContext) -> HostResult<ExecutionResult> {
        let guard = TimeoutGuard::arm(ctx.timeout)?;
        let spawned = self
            .shell_command(line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn();
        let child = match spawned {
            Ok(child) => child,
            Err(err) => {
                tracing::warn!(%err, "Failed to spawn {}", self.interpreter.display());
                return Ok(ExecutionResult::spawn_failure(&err.to_string(), ctx.decode));
            }
        };

        let pid = child_pid(&child);
        guard.on_expiry(Box::new(move || kill_group(pid)));

        let output = child.wait_with_output().map_err(HostError::from);
        let result = output.map(|out| {
            ExecutionResult::from_exit(exit_code(out.status), out.stdout, out.stderr, ctx.decode)
        });
        guard.finish(result)
    }

    fn interactive(&mut self, line: &str, ctx: &ExecContext) -> HostResult<i32> {
        let guard = TimeoutGuard::arm(ctx.timeout)?;
        // Stays in the terminal's foreground process group so it can read the tty.
        let mut child = self
            .shell_command(line)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|err| HostError::Spawn(err.to_string()))?;

        let pid = child_pid(&child);
        guard.on_expiry(Box::new(move || kill_child(pid)));

        let status = child.wait().map_err(HostError::from);
        guard.finish(status.map(exit_code))
    }

    fn stream(&mut self, line: &str, ctx: &ExecContext) -> HostResult<ChunkStream> {
        let guard = TimeoutGuard::arm(ctx.timeout)?;
        let mut child = self
            .shell_command(line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
            .map_err(|err| HostError::Spawn(err.to_string()))?;

        let pid = child_pid(&child);
        guard.on_expiry(Box::new(move || kill_group(pid)));

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stream = LocalStream {
            guard,
            child,
            stdout,
            stderr,
            out_lines: LineBuffer::new(),
            err_lines: LineBuffer::new(),
            pending: std::collections::VecDeque::new(),
            done: false,
        };
        if let Some(out) = &stream.stdout {
            set_nonblocking(out)?;
        }
        if let Some(err) = &stream.stderr {
            set_nonblocking(err)?;
        }
        Ok(Box::new(stream))
    }

    fn open(&mut self, path: &str, mode: OpenMode) -> HostResult<Box<dyn FileHandle>> {
        let mut options = OpenOptions::new();
        match mode {
            OpenMode::Read => options.read(true),
            OpenMode::Write => options.write(true).create(true).truncate(true),
            OpenMode::Append => options.append(true).create(true),
            OpenMode::ReadWrite => options.read(true).write(true),
        };
        let file = options.open(path)?;
        Ok(Box::new(LocalFile { file }))
    }

    fn is_connected(&self) -> HostResult<()> {
        Ok(())
    }

    fn try_clone(&self) -> HostResult<Box<dyn Backend>> {
        Ok(Box::new(self.clone()))
    }

    fn disconnect(&mut self) -> HostResult<()> {
        Ok(())
    }
}

/// Streaming execution of a local child
struct LocalStream {
    guard: TimeoutGuard,
    child: Child,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    out_lines: LineBuffer,
    err_lines: LineBuffer,
    pending: std::collections::VecDeque<StreamChunk>,
    done: bool,
}

enum Pipe {
    Out,
    Err,
}

impl LocalStream {
    /// Waits for at most one poll slice and reads whatever became ready
    fn pump(&mut self) -> HostResult<()> {
        let wait = self.guard.clamp(POLL_SLICE);
        let timeout = PollTimeout::from(u16::try_from(wait.as_millis()).unwrap_or(u16::MAX));
        let ready_mask = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;

        let (out_ready, err_ready) = {
            let mut fds = Vec::with_capacity(2);
            let mut order = Vec::with_capacity(2);
            if let Some(out) = &self.stdout {
                fds.push(PollFd::new(out.as_fd(), PollFlags::POLLIN));
                order.push(Pipe::Out);
            }
            if let Some(err) = &self.stderr {
                fds.push(PollFd::new(err.as_fd(), PollFlags::POLLIN));
                order.push(Pipe::Err);
            }
            match poll(&mut fds, timeout) {
                Ok(_) | Err(Errno::EINTR) => {}
                Err(err) => return Err(err.into()),
            }
            let mut out_ready = false;
            let mut err_ready = false;
            for (fd, pipe) in fds.iter().zip(order) {
                let ready = fd.revents().is_some_and(|r| r.intersects(ready_mask));
                match pipe {
                    Pipe::Out => out_ready = ready,
                    Pipe::Err => err_ready = ready,
                }
            }
            (out_ready, err_ready)
        };

        if out_ready {
            self.read_stdout()?;
        }
        if err_ready {
            self.read_stderr()?;
        }
        Ok(())
    }

    fn read_stdout(&mut self) -> HostResult<()> {
        let Some(pipe) = self.stdout.as_mut() else {
            return Ok(());
        };
        match read_available(pipe)? {
            Some(data) => {
                let lines = self.out_lines.push(&data);
                self.pending.extend(lines.into_iter().map(StreamChunk::Stdout));
            }
            None => {
                self.stdout = None;
                if let Some(rest) = self.out_lines.finish() {
                    self.pending.push_back(StreamChunk::Stdout(rest));
                }
            }
        }
        Ok(())
    }

    fn read_stderr(&mut self) -> HostResult<()> {
        let Some(pipe) = self.stderr.as_mut() else {
            return Ok(());
        };
        match read_available(pipe)? {
            Some(data) => {
                let lines = self.err_lines.push(&data);
                self.pending.extend(lines.into_iter().map(StreamChunk::Stderr));
            }
            None => {
                self.stderr = None;
                if let Some(rest) = self.err_lines.finish() {
                    self.pending.push_back(StreamChunk::Stderr(rest));
                }
            }
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.done = true;
        kill_group(child_pid(&self.child));
        if let Err(err) = self.child.wait() {
            tracing::debug!(%err, "Reaping aborted child failed");
        }
    }
}

/// Reads what is available; `None` at end of stream
fn read_available(pipe: &mut impl Read) -> HostResult<Option<Vec<u8>>> {
    let mut buf = vec![0u8; READ_CHUNK];
    match pipe.read(&mut buf) {
        Ok(0) => Ok(None),
        Ok(n) => {
            buf.truncate(n);
            Ok(Some(buf))
        }
        Err(err) if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
            Ok(Some(Vec::new()))
        }
        Err(err) => Err(err.into()),
    }
}

impl Iterator for LocalStream {
    type Item = HostResult<StreamChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                return Some(Ok(chunk));
            }
            if self.done {
                return None;
            }
            if let Err(err) = self.guard.check() {
                self.abort();
                return Some(Err(err));
            }
            if self.stdout.is_none() && self.stderr.is_none() {
                // Both pipes closed; the child may still be running.
                match self.child.try_wait() {
                    Ok(Some(status)) => {
                        self.done = true;
                        return Some(Ok(StreamChunk::status(exit_code(status))));
                    }
                    Ok(None) => {
                        std::thread::sleep(self.guard.clamp(POLL_SLICE));
                        continue;
                    }
                    Err(err) => {
                        self.abort();
                        return Some(Err(err.into()));
                    }
                }
            }
            if let Err(err) = self.pump() {
                self.abort();
                return Some(Err(err));
            }
        }
    }
}

impl Drop for LocalStream {
    fn drop(&mut self) {
        if !self.done {
            tracing::debug!("Stream dropped early, killing child");
            self.abort();
        }
    }
}

/// A file on the local filesystem
#[derive(Debug)]
pub struct LocalFile {
    file: File,
}

impl Read for LocalFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl io::Write for LocalFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl io::Seek for LocalFile {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl FileHandle for LocalFile {
    fn size(&mut self) -> HostResult<u64> {
        Ok(self.file.metadata()?.len())
    }
}
