//! Error types for hostrun
//!
//! A command that runs and exits non-zero is not an error: it is reported as
//! `success = false` in [`crate::ExecutionResult`] or in the final stream
//! status. Only conditions that prevent a result from existing end up here.

use thiserror::Error;

/// Errors raised by hosts, backends and their helpers
#[derive(Debug, Error)]
pub enum HostError {
    /// Unknown control name or a value of the wrong type
    #[error("Configuration error: {0}")]
    Config(String),

    /// Name resolution, handshake or authentication failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Remote operation attempted without a live session
    #[error("you are not connected")]
    NotConnected,

    /// The armed deadline elapsed before the operation completed
    #[error("operation timed out after {seconds}s")]
    Timeout {
        /// Configured deadline in seconds
        seconds: u64,
    },

    /// The local command interpreter could not be started
    #[error("unable to spawn command: {0}")]
    Spawn(String),

    /// Path does not exist on the host
    #[error("'{0}' does not exist")]
    NotFound(String),

    /// Path exists but is not a directory
    #[error("'{0}' is not a directory")]
    NotADirectory(String),

    /// A helper command exited non-zero
    #[error("{command}: {stderr}")]
    Command {
        /// The helper that failed (`ls`, `du`, ...)
        command: String,
        /// Captured error output
        stderr: String,
    },

    /// SSH transport failure after the connection was established
    #[error("Transport error: {0}")]
    Transport(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    /// Returns true for a deadline expiry
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true for failures that leave the connection unusable
    #[must_use]
    pub const fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::NotConnected | Self::Transport(_)
        )
    }
}

impl From<ssh2::Error> for HostError {
    fn from(err: ssh2::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<nix::Error> for HostError {
    fn from(err: nix::Error) -> Self {
        Self::Io(std::io::Error::from(err))
    }
}

/// Result type for host operations
pub type HostResult<T> = std::result::Result<T, HostError>;
