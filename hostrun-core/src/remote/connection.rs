//! Connection state for a remote host

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use secrecy::SecretString;

use super::resolve::{Resolved, Resolver, SystemResolver};
use super::ssh::SshConnector;
use super::{Connector, Transport};
use crate::error::{HostError, HostResult};
use crate::tracing::span_names;

/// User name used when none is given
pub const DEFAULT_USERNAME: &str = "root";

/// SSH port used when none is given
pub const DEFAULT_PORT: u16 = 22;

/// How to authenticate
#[derive(Clone, Default)]
pub enum AuthMethod {
    /// Agent first, then the usual key files under `~/.ssh`
    #[default]
    Default,
    /// SSH agent only
    Agent,
    /// Password
    Password(SecretString),
    /// Private key file with optional passphrase
    KeyFile {
        /// Path to the private key
        path: PathBuf,
        /// Passphrase protecting the key
        passphrase: Option<SecretString>,
    },
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "Default"),
            Self::Agent => write!(f, "Agent"),
            Self::Password(_) => write!(f, "Password(***)"),
            Self::KeyFile { path, passphrase } => f
                .debug_struct("KeyFile")
                .field("path", path)
                .field("passphrase", &passphrase.as_ref().map(|_| "***"))
                .finish(),
        }
    }
}

/// Parameters for [`RemoteConnection::connect`]
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Login name
    pub username: String,
    /// SSH port
    pub port: u16,
    /// Request agent forwarding on every channel
    pub forward_agent: bool,
    /// Connect over IPv6 when both families resolve
    pub prefer_ipv6: bool,
    /// Keep-alive interval in seconds
    pub keepalive_secs: Option<u32>,
    /// Authentication method
    pub auth: AuthMethod,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            username: DEFAULT_USERNAME.to_string(),
            port: DEFAULT_PORT,
            forward_agent: true,
            prefer_ipv6: false,
            keepalive_secs: None,
            auth: AuthMethod::Default,
        }
    }
}

impl ConnectOptions {
    /// Default options: `root` on port 22 with agent forwarding
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the login name
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Sets the port
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enables or disables agent forwarding
    #[must_use]
    pub const fn with_forward_agent(mut self, forward_agent: bool) -> Self {
        self.forward_agent = forward_agent;
        self
    }

    /// Prefers IPv6 when both families resolve
    #[must_use]
    pub const fn with_prefer_ipv6(mut self, prefer_ipv6: bool) -> Self {
        self.prefer_ipv6 = prefer_ipv6;
        self
    }

    /// Sets the keep-alive interval
    #[must_use]
    pub const fn with_keepalive(mut self, secs: Option<u32>) -> Self {
        self.keepalive_secs = secs;
        self
    }

    /// Sets the authentication method
    #[must_use]
    pub fn with_auth(mut self, auth: AuthMethod) -> Self {
        self.auth = auth;
        self
    }
}

/// A connection to a remote host
///
/// Clones share the transport: closing it through one clone closes it for
/// all of them.
#[derive(Clone)]
pub struct RemoteConnection {
    target: String,
    resolved: Resolved,
    address: IpAddr,
    port: u16,
    username: String,
    forward_agent: bool,
    transport: Option<Arc<dyn Transport>>,
}

impl RemoteConnection {
    /// Resolves `target` and opens an SSH session to it
    ///
    /// # Errors
    ///
    /// Returns `HostError::Connection` if the name does not resolve or the
    /// handshake or authentication fails.
    pub fn connect(target: &str, options: &ConnectOptions) -> HostResult<Self> {
        Self::connect_with(target, options, &SystemResolver, &SshConnector::new())
    }

    /// Like [`Self::connect`] with explicit name service and transport
    ///
    /// # Errors
    ///
    /// Returns `HostError::Connection` if the name does not resolve or the
    /// connector fails.
    pub fn connect_with(
        target: &str,
        options: &ConnectOptions,
        resolver: &dyn Resolver,
        connector: &dyn Connector,
    ) -> HostResult<Self> {
        let resolved = Resolved::resolve(target, resolver)?;
        let address = resolved.choose(options.prefer_ipv6).ok_or_else(|| {
            HostError::Connection(format!("no usable address for '{target}'"))
        })?;

        let _span = crate::trace_operation!(span_names::CONNECT, host = target).entered();
        tracing::info!(
            host = target,
            %address,
            port = options.port,
            username = %options.username,
            "Connecting"
        );
        let transport = connector
            .connect(SocketAddr::new(address, options.port), options)
            .map_err(|err| match err {
                HostError::Connection(_) => err,
                other => HostError::Connection(other.to_string()),
            })?;

        Ok(Self {
            target: target.to_string(),
            resolved,
            address,
            port: options.port,
            username: options.username.clone(),
            forward_agent: options.forward_agent,
            transport: Some(transport),
        })
    }

    /// Closes the session
    ///
    /// # Errors
    ///
    /// Returns `HostError::NotConnected` if already closed, through this
    /// handle or a clone, or the transport error if the disconnect fails.
    pub fn disconnect(&mut self) -> HostResult<()> {
        let transport = self
            .transport
            .take()
            .filter(|t| t.is_alive())
            .ok_or(HostError::NotConnected)?;
        let _span = crate::trace_operation!(span_names::DISCONNECT, host = %self.target).entered();
        tracing::info!("Disconnecting");
        transport.close()
    }

    /// Fails unless the session is open
    ///
    /// # Errors
    ///
    /// Returns `HostError::NotConnected` if never connected, disconnected,
    /// or the transport died.
    pub fn is_connected(&self) -> HostResult<()> {
        match &self.transport {
            Some(transport) if transport.is_alive() => Ok(()),
            _ => Err(HostError::NotConnected),
        }
    }

    /// The live transport
    ///
    /// # Errors
    ///
    /// Returns `HostError::NotConnected` when the session is not open.
    pub fn transport(&self) -> HostResult<Arc<dyn Transport>> {
        self.is_connected()?;
        self.transport.clone().ok_or(HostError::NotConnected)
    }

    /// Target as given to [`Self::connect`]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Resolved IPv4 address
    pub const fn ipv4(&self) -> Option<Ipv4Addr> {
        self.resolved.ipv4
    }

    /// Resolved IPv6 address
    pub const fn ipv6(&self) -> Option<Ipv6Addr> {
        self.resolved.ipv6
    }

    /// Canonical name
    pub fn fqdn(&self) -> Option<&str> {
        self.resolved.fqdn.as_deref()
    }

    /// Address the session was opened to
    pub const fn address(&self) -> IpAddr {
        self.address
    }

    /// SSH port
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Login name
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Whether channels request agent forwarding
    pub const fn forward_agent(&self) -> bool {
        self.forward_agent
    }
}

impl fmt::Debug for RemoteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConnection")
            .field("target", &self.target)
            .field("resolved", &self.resolved)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("forward_agent", &self.forward_agent)
            .field("open", &self.transport.is_some())
            .finish()
    }
}
