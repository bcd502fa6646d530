//! CLI error types and exit codes.

use hostrun_core::HostError;

/// Exit codes for CLI operations
///
/// A command that ran exits with its own status instead.
pub mod exit_codes {
    /// General error - configuration, IO, or other non-connection errors
    pub const GENERAL_ERROR: i32 = 1;
    /// Connection failure - the host could not be reached or the session
    /// broke
    pub const CONNECTION_FAILURE: i32 = 2;
    /// The `--timeout` deadline passed
    pub const TIMEOUT: i32 = 3;
}

/// CLI error type
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Deadline passed
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// Host operation failed
    #[error("{0}")]
    Host(String),

    /// Serialization error
    #[error("Output error: {0}")]
    Output(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<HostError> for CliError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::Config(msg) => Self::Config(msg),
            HostError::Timeout { seconds } => Self::Timeout(seconds),
            HostError::Io(e) => Self::Io(e),
            other if other.is_connection_failure() => Self::Connection(other.to_string()),
            other => Self::Host(other.to_string()),
        }
    }
}

impl CliError {
    /// Returns the appropriate exit code for this error type.
    ///
    /// Exit codes:
    /// - 1: General error (configuration, IO, failed helper command)
    /// - 2: Connection failure
    /// - 3: Timeout
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Connection(_) => exit_codes::CONNECTION_FAILURE,
            Self::Timeout(_) => exit_codes::TIMEOUT,
            Self::Config(_) | Self::Host(_) | Self::Output(_) | Self::Io(_) => {
                exit_codes::GENERAL_ERROR
            }
        }
    }
}
