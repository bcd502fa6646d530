//! Structured logging for hostrun
//!
//! Library code only emits `tracing` events and spans. Binaries call
//! [`init_tracing`] once to install a subscriber with an `EnvFilter` and a
//! formatting layer writing to stdout, stderr or a file.

use std::path::PathBuf;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Global flag indicating whether tracing has been initialized
static TRACING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Global tracing configuration
static TRACING_CONFIG: OnceLock<TracingConfig> = OnceLock::new();

/// Errors that can occur during tracing initialization
#[derive(Debug, Error)]
pub enum TracingError {
    /// Failed to initialize tracing subscriber
    #[error("Failed to initialize tracing: {0}")]
    InitializationFailed(String),

    /// Tracing already initialized
    #[error("Tracing has already been initialized")]
    AlreadyInitialized,

    /// Failed to create log file
    #[error("Failed to create log file: {0}")]
    FileCreationFailed(String),
}

/// Result type for tracing operations
pub type TracingResult<T> = Result<T, TracingError>;

/// Tracing log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracingLevel {
    /// Only errors
    Error,
    /// Errors and warnings (default)
    #[default]
    Warn,
    /// Connects, disconnects and other milestones
    Info,
    /// Every formatted command line
    Debug,
    /// Everything, including timer and poll details
    Trace,
}

impl TracingLevel {
    /// Converts to tracing crate's Level
    #[must_use]
    pub const fn to_tracing_level(self) -> Level {
        match self {
            Self::Error => Level::ERROR,
            Self::Warn => Level::WARN,
            Self::Info => Level::INFO,
            Self::Debug => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// Level for a `-v` count: 0 warn, 1 info, 2 debug, 3+ trace
    #[must_use]
    pub const fn from_verbosity(count: u8) -> Self {
        match count {
            0 => Self::Warn,
            1 => Self::Info,
            2 => Self::Debug,
            _ => Self::Trace,
        }
    }
}

impl std::str::FromStr for TracingLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for TracingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
            Self::Trace => write!(f, "trace"),
        }
    }
}

/// Output destination for tracing logs
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TracingOutput {
    /// Output to stdout
    Stdout,
    /// Output to stderr, keeping stdout for command output
    #[default]
    Stderr,
    /// Output to a file, truncated on start
    File(PathBuf),
}

/// Configuration for tracing initialization
#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    /// Log level
    pub level: TracingLevel,
    /// Output destination
    pub output: TracingOutput,
    /// Include thread ids; useful to tell timeout watchdogs apart
    pub thread_ids: bool,
    /// Custom filter string (overrides level if set)
    pub filter: Option<String>,
}

impl TracingConfig {
    /// Creates a new tracing configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the log level
    #[must_use]
    pub const fn with_level(mut self, level: TracingLevel) -> Self {
        self.level = level;
        self
    }

    /// Sets the output destination
    #[must_use]
    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    /// Enables or disables thread ids
    #[must_use]
    pub const fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.thread_ids = enabled;
        self
    }

    /// Sets a custom filter string
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Filter directive used when no custom filter is set
    #[must_use]
    pub fn default_directive(&self) -> String {
        format!("hostrun_core={level},hostrun={level}", level = self.level)
    }
}

/// Initializes the tracing subscriber with the given configuration
///
/// Call once at startup. `RUST_LOG` is ignored; use
/// [`TracingConfig::with_filter`] for custom directives.
///
/// # Errors
///
/// Returns an error if:
/// - Tracing has already been initialized
/// - The subscriber fails to initialize
/// - File output is configured but the file cannot be created
pub fn init_tracing(config: &TracingConfig) -> TracingResult<()> {
    if TRACING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return Err(TracingError::AlreadyInitialized);
    }

    let _ = TRACING_CONFIG.set(config.clone());

    let filter = if let Some(ref custom_filter) = config.filter {
        EnvFilter::try_new(custom_filter)
            .map_err(|e| TracingError::InitializationFailed(e.to_string()))?
    } else {
        EnvFilter::try_new(config.default_directive()).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let (writer, ansi) = match &config.output {
        TracingOutput::Stdout => (BoxMakeWriter::new(std::io::stdout), true),
        TracingOutput::Stderr => (BoxMakeWriter::new(std::io::stderr), true),
        TracingOutput::File(path) => {
            let file = std::fs::File::create(path)
                .map_err(|e| TracingError::FileCreationFailed(format!("{}: {e}", path.display())))?;
            (BoxMakeWriter::new(std::sync::Mutex::new(file)), false)
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(config.thread_ids)
                .with_ansi(ansi)
                .with_writer(writer),
        )
        .try_init()
        .map_err(|e| TracingError::InitializationFailed(e.to_string()))?;

    tracing::debug!(level = %config.level, "Tracing initialized");
    Ok(())
}

/// Checks if tracing has been initialized
#[must_use]
pub fn is_tracing_initialized() -> bool {
    TRACING_INITIALIZED.load(Ordering::SeqCst)
}

/// Gets the current tracing configuration (if initialized)
#[must_use]
pub fn get_tracing_config() -> Option<&'static TracingConfig> {
    TRACING_CONFIG.get()
}

/// Macro for creating operation spans with standard fields
///
/// # Examples
///
/// ```ignore
/// use hostrun_core::trace_operation;
/// use hostrun_core::tracing::span_names;
///
/// let _span = trace_operation!(span_names::CONNECT, host = %target).entered();
/// ```
#[macro_export]
macro_rules! trace_operation {
    ($name:expr) => {
        tracing::info_span!($name)
    };
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}

/// Macro for creating debug-level operation spans
///
/// Similar to `trace_operation!` but at debug level for per-command work.
#[macro_export]
macro_rules! trace_operation_debug {
    ($name:expr) => {
        tracing::debug_span!($name)
    };
    ($name:expr, $($field:tt)*) => {
        tracing::debug_span!($name, $($field)*)
    };
}

/// Standard span names for hostrun operations
pub mod span_names {
    /// Batch execution
    pub const EXECUTE: &str = "host.execute";
    /// Interactive execution
    pub const INTERACTIVE: &str = "host.interactive";
    /// Streaming execution
    pub const STREAM: &str = "host.stream";
    /// Following a file
    pub const TAIL: &str = "host.tail";
    /// SSH connection establishment
    pub const CONNECT: &str = "connection.establish";
    /// SSH disconnect
    pub const DISCONNECT: &str = "connection.disconnect";
    /// Configuration load
    pub const CONFIG_LOAD: &str = "config.load";
    /// Configuration save
    pub const CONFIG_SAVE: &str = "config.save";
}
