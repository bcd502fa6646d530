//! Scripted SSH transport, resolver and terminal for remote tests

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::os::fd::BorrowedFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use hostrun_core::remote::resolve::Family;
use hostrun_core::{
    ConnectOptions, Connector, ExecChannel, FileHandle, HostError, HostResult, OpenMode,
    RemoteConnection, Resolver, Terminal, Transport,
};

pub const WEB1_V4: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);
pub const WEB1_FQDN: &str = "web1.example.net";

/// What every channel opened on a [`MockTransport`] plays back
#[derive(Debug, Clone, Default)]
pub struct Reply {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
    /// Reading stdout fails as if the socket was reset
    pub fail_reads: bool,
    /// Nothing ever arrives and the command never exits
    pub hang: bool,
    /// `exec` blocks until the transport is interrupted
    pub block_exec: bool,
    /// Stderr stays silent until stdout has reported EOF
    pub stderr_after_stdout: bool,
    /// Largest read handed out at once, 0 for unlimited
    pub chunk_size: usize,
    /// Exit status polls answered with `None` before the real status
    pub status_delay: usize,
}

impl Reply {
    pub fn output(stdout: &str, stderr: &str, exit_code: i32) -> Self {
        Self {
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
            exit_code,
            ..Self::default()
        }
    }
}

/// Everything the code under test asked the transport to do
#[derive(Debug, Default)]
pub struct Journal {
    pub lines: Vec<String>,
    pub agent_requests: usize,
    pub pty_requests: usize,
    pub channels_opened: usize,
    pub channels_closed: usize,
    pub closes: usize,
}

pub struct MockTransport {
    alive: Arc<AtomicBool>,
    reply: Reply,
    journal: Arc<Mutex<Journal>>,
}

impl MockTransport {
    pub fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            alive: Arc::new(AtomicBool::new(true)),
            reply,
            journal: Arc::new(Mutex::new(Journal::default())),
        })
    }

    pub fn journal(&self) -> MutexGuard<'_, Journal> {
        self.journal.lock().unwrap()
    }
}

impl Transport for MockTransport {
    fn open_channel(&self) -> HostResult<Box<dyn ExecChannel>> {
        if !self.is_alive() {
            return Err(HostError::Transport("session closed".into()));
        }
        self.journal().channels_opened += 1;
        Ok(Box::new(MockChannel {
            reply: self.reply.clone(),
            out_pos: 0,
            err_pos: 0,
            stdout_eof: false,
            status_polls: 0,
            alive: Arc::clone(&self.alive),
            journal: Arc::clone(&self.journal),
        }))
    }

    fn open_file(&self, path: &str, _mode: OpenMode) -> HostResult<Box<dyn FileHandle>> {
        Err(HostError::NotFound(path.to_string()))
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn set_blocking(&self, _blocking: bool) {}

    fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        None
    }

    fn interrupt(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    fn close(&self) -> HostResult<()> {
        self.alive.store(false, Ordering::SeqCst);
        self.journal().closes += 1;
        Ok(())
    }
}

struct MockChannel {
    reply: Reply,
    out_pos: usize,
    err_pos: usize,
    stdout_eof: bool,
    status_polls: usize,
    alive: Arc<AtomicBool>,
    journal: Arc<Mutex<Journal>>,
}

fn play(data: &[u8], pos: &mut usize, buf: &mut [u8], chunk_size: usize) -> usize {
    let limit = if chunk_size == 0 { buf.len() } else { chunk_size.min(buf.len()) };
    let n = (data.len() - *pos).min(limit);
    buf[..n].copy_from_slice(&data[*pos..*pos + n]);
    *pos += n;
    n
}

impl ExecChannel for MockChannel {
    fn request_agent_forwarding(&mut self) -> HostResult<()> {
        self.journal.lock().unwrap().agent_requests += 1;
        Ok(())
    }

    fn request_pty(&mut self) -> HostResult<()> {
        self.journal.lock().unwrap().pty_requests += 1;
        Ok(())
    }

    fn exec(&mut self, line: &str) -> HostResult<()> {
        self.journal.lock().unwrap().lines.push(line.to_string());
        if self.reply.block_exec {
            while self.alive.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(10));
            }
            return Err(HostError::Transport("socket shut down".into()));
        }
        Ok(())
    }

    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.reply.fail_reads {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"));
        }
        if self.reply.hang {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = play(&self.reply.stdout, &mut self.out_pos, buf, self.reply.chunk_size);
        if n == 0 {
            self.stdout_eof = true;
        }
        Ok(n)
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.reply.hang {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        if self.reply.stderr_after_stdout && !self.stdout_eof {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        Ok(play(&self.reply.stderr, &mut self.err_pos, buf, self.reply.chunk_size))
    }

    fn write_stdin(&mut self, data: &[u8]) -> io::Result<usize> {
        Ok(data.len())
    }

    fn send_eof(&mut self) -> HostResult<()> {
        Ok(())
    }

    fn exit_status(&mut self) -> HostResult<Option<i32>> {
        if self.reply.hang || self.status_polls < self.reply.status_delay {
            self.status_polls += 1;
            return Ok(None);
        }
        Ok(Some(self.reply.exit_code))
    }

    fn close(&mut self) -> HostResult<()> {
        self.journal.lock().unwrap().channels_closed += 1;
        Ok(())
    }
}

pub struct MockConnector {
    pub transport: Arc<MockTransport>,
    pub refuse: bool,
}

impl Connector for MockConnector {
    fn connect(&self, addr: SocketAddr, _options: &ConnectOptions) -> HostResult<Arc<dyn Transport>> {
        if self.refuse {
            return Err(HostError::Connection(format!("{addr}: authentication failed")));
        }
        let transport: Arc<dyn Transport> = self.transport.clone();
        Ok(transport)
    }
}

/// Knows `web1` and nothing else
pub struct TableResolver;

impl Resolver for TableResolver {
    fn lookup(&self, host: &str, family: Family) -> Option<IpAddr> {
        match (host, family) {
            ("web1" | WEB1_FQDN, Family::V4) => Some(IpAddr::V4(WEB1_V4)),
            _ => None,
        }
    }

    fn reverse(&self, ip: IpAddr) -> Option<String> {
        (ip == IpAddr::V4(WEB1_V4)).then(|| WEB1_FQDN.to_string())
    }
}

/// Connects to `web1` over a fresh mock transport
pub fn connect(reply: Reply) -> (RemoteConnection, Arc<MockTransport>) {
    let transport = MockTransport::new(reply);
    let connector = MockConnector {
        transport: Arc::clone(&transport),
        refuse: false,
    };
    let connection =
        RemoteConnection::connect_with("web1", &ConnectOptions::new(), &TableResolver, &connector)
            .unwrap();
    (connection, transport)
}

#[derive(Debug, Default)]
pub struct TermState {
    pub raw: bool,
    pub enters: usize,
    pub restores: usize,
    pub output: Vec<u8>,
}

/// Terminal whose state the test can inspect after the backend owns it
#[derive(Clone, Default)]
pub struct SharedTerminal {
    pub state: Arc<Mutex<TermState>>,
}

impl Terminal for SharedTerminal {
    fn enter_raw(&mut self) -> HostResult<()> {
        let mut state = self.state.lock().unwrap();
        state.raw = true;
        state.enters += 1;
        Ok(())
    }

    fn restore(&mut self) -> HostResult<()> {
        let mut state = self.state.lock().unwrap();
        state.raw = false;
        state.restores += 1;
        Ok(())
    }

    fn input_fd(&self) -> Option<BorrowedFd<'_>> {
        None
    }

    fn read_input(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }

    fn write_output(&mut self, data: &[u8]) -> io::Result<()> {
        self.state.lock().unwrap().output.extend_from_slice(data);
        Ok(())
    }
}
