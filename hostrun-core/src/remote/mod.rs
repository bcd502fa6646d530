//! Remote hosts reached over SSH
//!
//! The SSH protocol itself is consumed through three small traits:
//!
//! - [`Connector`] opens an authenticated [`Transport`] to an address
//! - [`Transport`] is one session: it opens channels and files
//! - [`ExecChannel`] runs one command
//!
//! [`ssh::SshConnector`] implements them over libssh2. Tests plug in
//! scripted implementations.

pub mod backend;
pub mod connection;
pub mod resolve;
pub mod ssh;

use std::io;
use std::net::SocketAddr;
use std::os::fd::BorrowedFd;
use std::sync::Arc;

use crate::backend::{FileHandle, OpenMode};
use crate::error::HostResult;

pub use backend::RemoteBackend;
pub use connection::{AuthMethod, ConnectOptions, RemoteConnection};
pub use resolve::{Resolved, Resolver, SystemResolver};
pub use ssh::SshConnector;

/// Opens authenticated sessions
pub trait Connector: Send + Sync {
    /// Connects to `addr` and authenticates as described by `options`
    ///
    /// # Errors
    ///
    /// Returns `HostError::Connection` on handshake or authentication failure.
    fn connect(&self, addr: SocketAddr, options: &ConnectOptions) -> HostResult<Arc<dyn Transport>>;
}

/// An authenticated SSH session, shared by every clone of a connection
pub trait Transport: Send + Sync {
    /// Opens a session channel
    ///
    /// # Errors
    ///
    /// Returns `HostError::Transport` if the server refuses the channel.
    fn open_channel(&self) -> HostResult<Box<dyn ExecChannel>>;

    /// Opens a file over SFTP
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    fn open_file(&self, path: &str, mode: OpenMode) -> HostResult<Box<dyn FileHandle>>;

    /// Returns false once the session is closed or the socket is gone
    fn is_alive(&self) -> bool;

    /// Switches the whole session between blocking and non-blocking IO
    fn set_blocking(&self, blocking: bool);

    /// Socket descriptor to poll for readability, if there is one
    fn poll_fd(&self) -> Option<BorrowedFd<'_>>;

    /// Shuts the socket down so every pending call returns
    ///
    /// Safe to call from another thread.
    fn interrupt(&self);

    /// Closes the session
    ///
    /// # Errors
    ///
    /// Returns `HostError::Transport` if the disconnect message fails.
    fn close(&self) -> HostResult<()>;
}

/// One command running on a remote host
///
/// Reads follow the session's blocking mode: in non-blocking mode they
/// return `ErrorKind::WouldBlock` when no data is buffered, and `Ok(0)` only
/// at end of stream.
pub trait ExecChannel: Send {
    /// Requests SSH agent forwarding for this channel
    ///
    /// # Errors
    ///
    /// Returns `HostError::Transport` if the server refuses.
    fn request_agent_forwarding(&mut self) -> HostResult<()>;

    /// Requests a pseudo-terminal
    ///
    /// # Errors
    ///
    /// Returns `HostError::Transport` if the server refuses.
    fn request_pty(&mut self) -> HostResult<()>;

    /// Starts `line`
    ///
    /// # Errors
    ///
    /// Returns `HostError::Transport` if the exec request fails.
    fn exec(&mut self, line: &str) -> HostResult<()>;

    /// Reads standard output
    ///
    /// # Errors
    ///
    /// Returns `WouldBlock` when nothing is buffered in non-blocking mode.
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Reads standard error
    ///
    /// # Errors
    ///
    /// Returns `WouldBlock` when nothing is buffered in non-blocking mode.
    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes to standard input
    ///
    /// # Errors
    ///
    /// Returns `WouldBlock` when the remote window is full in non-blocking
    /// mode.
    fn write_stdin(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Signals end of standard input
    ///
    /// # Errors
    ///
    /// Returns `HostError::Transport` if the message cannot be sent.
    fn send_eof(&mut self) -> HostResult<()>;

    /// Exit status, `None` while it has not arrived yet
    ///
    /// # Errors
    ///
    /// Returns `HostError::Transport` if the session fails while waiting.
    fn exit_status(&mut self) -> HostResult<Option<i32>>;

    /// Closes the channel
    ///
    /// # Errors
    ///
    /// Returns `HostError::Transport` if the close message fails.
    fn close(&mut self) -> HostResult<()>;
}
