//! libssh2 transport
//!
//! Host keys are accepted without verification, like an SSH client with
//! `StrictHostKeyChecking=no`.

use std::io::{self, Read, Seek, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::fd::{AsFd, BorrowedFd};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use secrecy::ExposeSecret;
use ssh2::{Channel, OpenFlags, OpenType, Session};

use super::connection::{AuthMethod, ConnectOptions};
use super::{Connector, ExecChannel, Transport};
use crate::backend::{FileHandle, OpenMode};
use crate::error::{HostError, HostResult};

/// Receive window requested for every channel
pub const CHANNEL_WINDOW_SIZE: u32 = 2_147_483_647;

/// Maximum packet size requested for every channel
pub const CHANNEL_PACKET_SIZE: u32 = 32_768;

/// Key files tried after the agent with [`AuthMethod::Default`]
const DEFAULT_KEY_FILES: [&str; 3] = ["id_ed25519", "id_ecdsa", "id_rsa"];

/// Permissions of files created over SFTP
const NEW_FILE_MODE: i32 = 0o644;

/// `LIBSSH2_ERROR_EAGAIN`
const ERROR_EAGAIN: i32 = -37;

fn would_block(err: &ssh2::Error) -> bool {
    matches!(err.code(), ssh2::ErrorCode::Session(code) if code == ERROR_EAGAIN)
}

/// Connects with libssh2 over TCP
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

impl SshConnector {
    /// Creates a connector
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Connector for SshConnector {
    fn connect(&self, addr: SocketAddr, options: &ConnectOptions) -> HostResult<Arc<dyn Transport>> {
        let socket = TcpStream::connect(addr)
            .map_err(|err| HostError::Connection(format!("{addr}: {err}")))?;
        let mut session = Session::new()
            .map_err(|err| HostError::Connection(format!("unable to create SSH session: {err}")))?;
        session.set_tcp_stream(socket.try_clone()?);
        session
            .handshake()
            .map_err(|err| HostError::Connection(format!("handshake with {addr} failed: {err}")))?;

        authenticate(&session, options)?;
        if !session.authenticated() {
            return Err(HostError::Connection(format!(
                "authentication failed for {}@{addr}",
                options.username
            )));
        }

        if let Some(interval) = options.keepalive_secs {
            session.set_keepalive(true, interval);
        }
        tracing::debug!(%addr, "SSH session established");

        Ok(Arc::new(SshTransport {
            session,
            socket,
            closed: AtomicBool::new(false),
        }))
    }
}

fn authenticate(session: &Session, options: &ConnectOptions) -> HostResult<()> {
    let user = options.username.as_str();
    let result = match &options.auth {
        AuthMethod::Agent => session.userauth_agent(user),
        AuthMethod::Password(password) => session.userauth_password(user, password.expose_secret()),
        AuthMethod::KeyFile { path, passphrase } => session.userauth_pubkey_file(
            user,
            None,
            path,
            passphrase.as_ref().map(|p| p.expose_secret()),
        ),
        AuthMethod::Default => {
            if session.userauth_agent(user).is_ok() && session.authenticated() {
                return Ok(());
            }
            for key in default_key_files() {
                if session.userauth_pubkey_file(user, None, &key, None).is_ok()
                    && session.authenticated()
                {
                    tracing::debug!(key = %key.display(), "Authenticated with key file");
                    return Ok(());
                }
            }
            return Err(HostError::Connection(format!(
                "no agent identity or default key accepted for '{user}'"
            )));
        }
    };
    result.map_err(|err| HostError::Connection(format!("authentication failed: {err}")))
}

fn default_key_files() -> Vec<PathBuf> {
    let Some(home) = dirs::home_dir() else {
        return Vec::new();
    };
    DEFAULT_KEY_FILES
        .iter()
        .map(|name| home.join(".ssh").join(name))
        .filter(|path| path.exists())
        .collect()
}

/// An SSH session over a TCP socket
pub struct SshTransport {
    session: Session,
    socket: TcpStream,
    closed: AtomicBool,
}

impl Transport for SshTransport {
    fn open_channel(&self) -> HostResult<Box<dyn ExecChannel>> {
        let channel = self.session.channel_open(
            "session",
            CHANNEL_WINDOW_SIZE,
            CHANNEL_PACKET_SIZE,
            None,
        )?;
        Ok(Box::new(SshChannel { channel }))
    }

    fn open_file(&self, path: &str, mode: OpenMode) -> HostResult<Box<dyn FileHandle>> {
        let flags = match mode {
            OpenMode::Read => OpenFlags::READ,
            OpenMode::Write => OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
            OpenMode::Append => OpenFlags::WRITE | OpenFlags::APPEND | OpenFlags::CREATE,
            OpenMode::ReadWrite => OpenFlags::READ | OpenFlags::WRITE,
        };
        let sftp = self.session.sftp()?;
        let file = sftp
            .open_mode(Path::new(path), flags, NEW_FILE_MODE, OpenType::File)
            .map_err(|err| {
                let io_err = io::Error::from(err);
                if io_err.kind() == io::ErrorKind::NotFound {
                    HostError::NotFound(path.to_string())
                } else {
                    HostError::Io(io_err)
                }
            })?;
        Ok(Box::new(SftpFile { file }))
    }

    fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn set_blocking(&self, blocking: bool) {
        self.session.set_blocking(blocking);
    }

    fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.socket.as_fd())
    }

    fn interrupt(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Err(err) = self.socket.shutdown(Shutdown::Both) {
            tracing::debug!(%err, "Socket shutdown failed");
        }
    }

    fn close(&self) -> HostResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.session.set_blocking(true);
        let result = self.session.disconnect(None, "closed by client", None);
        let _ = self.socket.shutdown(Shutdown::Both);
        result.map_err(HostError::from)
    }
}

/// A libssh2 session channel
struct SshChannel {
    channel: Channel,
}

impl ExecChannel for SshChannel {
    fn request_agent_forwarding(&mut self) -> HostResult<()> {
        Ok(self.channel.request_auth_agent_forwarding()?)
    }

    fn request_pty(&mut self) -> HostResult<()> {
        Ok(self.channel.request_pty("xterm", None, None)?)
    }

    fn exec(&mut self, line: &str) -> HostResult<()> {
        Ok(self.channel.exec(line)?)
    }

    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.channel.read(buf)
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.channel.stderr().read(buf)
    }

    fn write_stdin(&mut self, data: &[u8]) -> io::Result<usize> {
        self.channel.write(data)
    }

    fn send_eof(&mut self) -> HostResult<()> {
        Ok(self.channel.send_eof()?)
    }

    fn exit_status(&mut self) -> HostResult<Option<i32>> {
        if !self.channel.eof() {
            return Ok(None);
        }
        // libssh2 reports 0 until the close handshake is done.
        match self.channel.wait_close() {
            Ok(()) => Ok(Some(self.channel.exit_status()?)),
            Err(err) if would_block(&err) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn close(&mut self) -> HostResult<()> {
        Ok(self.channel.close()?)
    }
}

/// A file opened over SFTP
struct SftpFile {
    file: ssh2::File,
}

impl Read for SftpFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for SftpFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for SftpFile {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl FileHandle for SftpFile {
    fn size(&mut self) -> HostResult<u64> {
        Ok(self.file.stat()?.size.unwrap_or(0))
    }
}
