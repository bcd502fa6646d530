//! A host commands run on
//!
//! [`Host`] ties the pieces together: it owns the controls, formats each
//! command under them and hands the line to its backend. Code written
//! against `Host` runs unchanged on the local machine or over SSH.

use std::io::{Read, Write};
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use crate::backend::{
    Backend, ChunkStream, ExecContext, ExecutionResult, FileHandle, LocalBackend, OpenMode, Output,
    StreamChunk,
};
use crate::command::{Command, FormattedCommand, format};
use crate::controls::{ControlValue, Controls, HasControls, Scoped};
use crate::error::HostResult;
use crate::remote::{ConnectOptions, RemoteBackend, RemoteConnection};
use crate::tail::{PathSource, TailFollower};
use crate::tracing::span_names;

/// Exit code reported before the first execution and after a failed one
pub const NO_RETURN_CODE: i32 = -1;

/// A local or remote host
pub struct Host {
    controls: Controls,
    backend: Box<dyn Backend>,
    return_code: i32,
}

impl Host {
    /// The local machine
    #[must_use]
    pub fn local() -> Self {
        Self::with_backend(Box::new(LocalBackend::new()))
    }

    /// A remote host over an open connection
    #[must_use]
    pub fn remote(connection: RemoteConnection) -> Self {
        Self::with_backend(Box::new(RemoteBackend::new(connection)))
    }

    /// Connects to `target` over SSH
    ///
    /// # Errors
    ///
    /// Returns `HostError::Connection` if the target does not resolve or the
    /// SSH session cannot be established.
    pub fn connect(target: &str, options: &ConnectOptions) -> HostResult<Self> {
        Ok(Self::remote(RemoteConnection::connect(target, options)?))
    }

    /// A host over any backend, with default controls
    #[must_use]
    pub fn with_backend(backend: Box<dyn Backend>) -> Self {
        Self {
            controls: Controls::default(),
            backend,
            return_code: NO_RETURN_CODE,
        }
    }

    /// Name of the backend (`local`, `ssh`)
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Current controls
    pub const fn controls(&self) -> &Controls {
        &self.controls
    }

    /// Mutable access to the controls
    pub fn controls_mut(&mut self) -> &mut Controls {
        &mut self.controls
    }

    /// Replaces all controls
    pub fn set_controls(&mut self, controls: Controls) {
        self.controls = controls;
    }

    /// Reads a control by name
    ///
    /// # Errors
    ///
    /// Returns `HostError::Config` for an unknown name.
    pub fn get_control(&self, name: &str) -> HostResult<ControlValue> {
        self.controls.get(name)
    }

    /// Writes a control by name
    ///
    /// # Errors
    ///
    /// Returns `HostError::Config` for an unknown name or a value of the
    /// wrong type.
    pub fn set_control(&mut self, name: &str, value: impl Into<ControlValue>) -> HostResult<()> {
        self.controls.set(name, value)
    }

    /// Overrides controls until the returned guard is dropped
    ///
    /// The guard dereferences to the host, so commands run through it see
    /// the overrides. Guards nest.
    ///
    /// # Errors
    ///
    /// Returns `HostError::Config` if an override is invalid; nothing is
    /// applied in that case.
    pub fn scoped<I, K, V>(&mut self, overrides: I) -> HostResult<Scoped<'_, Self>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ControlValue>,
    {
        Scoped::new(self, overrides)
    }

    /// Runs `body` with controls overridden, restoring them afterwards
    ///
    /// # Errors
    ///
    /// Returns `HostError::Config` if an override is invalid, otherwise
    /// whatever `body` returns.
    pub fn with_controls<I, K, V, T, F>(&mut self, overrides: I, body: F) -> HostResult<T>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ControlValue>,
        F: FnOnce(&mut Self) -> HostResult<T>,
    {
        let mut scope = self.scoped(overrides)?;
        body(&mut scope)
    }

    /// Exit code of the last execution, -1 before the first one
    pub const fn return_code(&self) -> i32 {
        self.return_code
    }

    /// Renders `command` under the current controls
    pub fn format(&self, command: &Command) -> FormattedCommand {
        format(command, &self.controls)
    }

    /// Runs `command` and captures its output
    ///
    /// A command marked interactive is run attached to the terminal instead
    /// and its captured output is empty.
    ///
    /// # Errors
    ///
    /// Returns `HostError::Timeout` when the `timeout` control elapses and
    /// `HostError::NotConnected` or transport errors for a remote host. A
    /// non-zero exit is reported through `success`, not as an error.
    pub fn execute(&mut self, command: &Command) -> HostResult<ExecutionResult> {
        let formatted = self.format(command);
        if formatted.interactive {
            return self.run_interactive(&formatted.line);
        }
        let ctx = ExecContext::from(&self.controls);
        let _span = tracing::debug_span!(span_names::EXECUTE, backend = self.backend.name()).entered();
        tracing::debug!("[execute] {}", formatted.line);

        let result = self.backend.execute(&formatted.line, &ctx);
        self.record(&result, |r| r.exit_code);
        result
    }

    /// Runs `command` attached to the terminal
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be started, the deadline
    /// passes or the remote session fails.
    pub fn interactive(&mut self, command: &Command) -> HostResult<ExecutionResult> {
        let line = self.format(command).line;
        self.run_interactive(&line)
    }

    fn run_interactive(&mut self, line: &str) -> HostResult<ExecutionResult> {
        let ctx = ExecContext::from(&self.controls);
        let _span =
            tracing::debug_span!(span_names::INTERACTIVE, backend = self.backend.name()).entered();
        tracing::debug!("[interactive] {}", line);

        let code = self.backend.interactive(line, &ctx);
        self.record(&code, |c| *c);
        code.map(|exit_code| ExecutionResult {
            success: exit_code == 0,
            stdout: Output::empty(ctx.decode),
            stderr: Output::empty(ctx.decode),
            exit_code,
        })
    }

    /// Starts `command` and yields its output line by line
    ///
    /// The stream borrows the host; `return_code` is updated when the final
    /// status arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be started.
    pub fn stream(&mut self, command: &Command) -> HostResult<OutputStream<'_>> {
        let formatted = self.format(command);
        let ctx = ExecContext::from(&self.controls);
        let _span = tracing::debug_span!(span_names::STREAM, backend = self.backend.name()).entered();
        tracing::debug!("[stream] {}", formatted.line);

        match self.backend.stream(&formatted.line, &ctx) {
            Ok(inner) => Ok(OutputStream {
                inner,
                return_code: &mut self.return_code,
            }),
            Err(err) => {
                self.return_code = NO_RETURN_CODE;
                Err(err)
            }
        }
    }

    /// Opens `path` on the host
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(&mut self, path: &str, mode: OpenMode) -> HostResult<Box<dyn FileHandle>> {
        self.backend.is_connected()?;
        self.backend.open(path, mode)
    }

    /// Reads the whole file at `path`
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    pub fn read(&mut self, path: &str) -> HostResult<Vec<u8>> {
        let mut file = self.open(path, OpenMode::Read)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Replaces the file at `path` with `data`
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or written.
    pub fn write(&mut self, path: &str, data: &[u8]) -> HostResult<()> {
        let mut file = self.open(path, OpenMode::Write)?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }

    /// Appends `data` to the file at `path`
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or written.
    pub fn append(&mut self, path: &str, data: &[u8]) -> HostResult<()> {
        let mut file = self.open(path, OpenMode::Append)?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }

    /// Follows the file at `path`, checking every `interval`
    ///
    /// The path is reopened on every cycle, so both truncation and
    /// replacement are seen as rotation.
    pub fn tail(&mut self, path: &str, interval: Duration) -> TailFollower<PathSource<'_>> {
        let _span = tracing::debug_span!(span_names::TAIL, path).entered();
        tracing::debug!(interval_ms = interval.as_millis() as u64, "[tail] {}", path);
        TailFollower::new(PathSource::new(self.backend.as_mut(), path), interval)
    }

    /// Fails unless commands can run
    ///
    /// # Errors
    ///
    /// Returns `HostError::NotConnected` for a closed remote session.
    pub fn is_connected(&self) -> HostResult<()> {
        self.backend.is_connected()
    }

    /// Closes the remote session; a no-op for the local machine
    ///
    /// # Errors
    ///
    /// Returns `HostError::NotConnected` if the session was already closed.
    pub fn disconnect(&mut self) -> HostResult<()> {
        self.backend.disconnect()
    }

    /// A second host sharing this one's session, controls and return code
    ///
    /// # Errors
    ///
    /// Returns `HostError::NotConnected` for a closed remote session.
    pub fn try_clone(&self) -> HostResult<Self> {
        Ok(Self {
            controls: self.controls.clone(),
            backend: self.backend.try_clone()?,
            return_code: self.return_code,
        })
    }

    fn record<T>(&mut self, result: &HostResult<T>, code: impl Fn(&T) -> i32) {
        self.return_code = match result {
            Ok(value) => code(value),
            Err(_) => NO_RETURN_CODE,
        };
    }
}

impl HasControls for Host {
    fn controls_mut(&mut self) -> &mut Controls {
        &mut self.controls
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("backend", &self.backend.name())
            .field("controls", &self.controls)
            .field("return_code", &self.return_code)
            .finish()
    }
}

/// Output of [`Host::stream`]
pub struct OutputStream<'a> {
    inner: ChunkStream,
    return_code: &'a mut i32,
}

impl Iterator for OutputStream<'_> {
    type Item = HostResult<StreamChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        match &item {
            Ok(StreamChunk::Status { exit_code, .. }) => *self.return_code = *exit_code,
            Err(_) => *self.return_code = NO_RETURN_CODE,
            Ok(_) => {}
        }
        Some(item)
    }
}

/// A remote host that disconnects when dropped
pub struct Session {
    host: Host,
}

impl Session {
    /// Connects to `target` for the lifetime of the session
    ///
    /// # Errors
    ///
    /// Returns `HostError::Connection` if the connection fails.
    pub fn open(target: &str, options: &ConnectOptions) -> HostResult<Self> {
        Ok(Self {
            host: Host::connect(target, options)?,
        })
    }

    /// Wraps an already connected host
    #[must_use]
    pub const fn from_host(host: Host) -> Self {
        Self { host }
    }
}

impl Deref for Session {
    type Target = Host;

    fn deref(&self) -> &Host {
        &self.host
    }
}

impl DerefMut for Session {
    fn deref_mut(&mut self) -> &mut Host {
        &mut self.host
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.host.is_connected().is_ok() {
            if let Err(err) = self.host.disconnect() {
                tracing::warn!(%err, "Disconnect failed");
            }
        }
    }
}
