//! hostrun Core Library
//!
//! Runs shell commands on the local machine or on remote hosts over SSH
//! through one [`Host`] interface.
//!
//! # Crate Structure
//!
//! - [`controls`] - Per-host settings that shape every command line
//! - [`command`] - Command description and rendering to a shell line
//! - [`backend`] - Execution backends and the local process backend
//! - [`remote`] - SSH connection, transport traits and remote backend
//! - [`host`] - The `Host` facade and RAII `Session`
//! - [`tail`] - Following a growing file across rotations
//! - [`fs`] - Path and system queries built on standard tools
//! - [`config`] - Settings file with default controls and host profiles
//! - [`tracing`] - Structured logging setup

// Enable missing_docs warning for public API documentation
#![warn(missing_docs)]

pub mod backend;
pub mod command;
pub mod config;
pub mod controls;
pub mod error;
pub mod fs;
pub mod host;
pub mod remote;
pub mod tail;
pub mod terminal;
pub mod timeout;
pub mod tracing;

pub use backend::{
    Backend, ChunkStream, ExecContext, ExecutionResult, FileHandle, LocalBackend, OpenMode,
    Output, StreamChunk,
};
pub use command::{Command, FormattedCommand, OptionValue, format, shell_quote};
pub use config::{ConfigManager, HostProfile, Settings};
pub use controls::{ControlValue, Controls, Decode, HasControls, OptionsPlace, Scoped};
pub use error::{HostError, HostResult};
pub use fs::HostPath;
pub use host::{Host, NO_RETURN_CODE, OutputStream, Session};
pub use remote::{
    AuthMethod, ConnectOptions, Connector, ExecChannel, RemoteBackend, RemoteConnection,
    Resolver, SshConnector, Transport,
};
pub use tail::{HandleSource, PathSource, TailFollower, TailSource, follow};
pub use terminal::{RawModeGuard, StdTerminal, Terminal};
pub use timeout::TimeoutGuard;
