//! Command descriptions and their rendering to a shell line
//!
//! A [`Command`] is data: a base program, positional arguments, ordered
//! named options and optional redirections. [`format`] turns it into the
//! single line handed to a shell under the current [`crate::Controls`].

mod format;
mod quote;

pub use format::{FormattedCommand, format};
pub use quote::{is_simple_word, shell_quote};

/// Prefix on a stdout/stderr redirect target that selects append mode
pub const APPEND_MARKER: char = '+';

/// Value of a named option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// `true` renders a bare flag, `false` omits the option
    Flag(bool),
    /// Renders `flag value`
    Value(String),
    /// Renders `flag value` once per element
    Values(Vec<String>),
}

impl OptionValue {
    /// Values to render after the flag, in order
    ///
    /// Flags yield no values; use [`Self::is_enabled`] to decide whether the
    /// flag itself is emitted.
    pub fn values(&self) -> &[String] {
        match self {
            Self::Flag(_) => &[],
            Self::Value(value) => std::slice::from_ref(value),
            Self::Values(values) => values,
        }
    }

    /// Returns false only for `Flag(false)`
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !matches!(self, Self::Flag(false))
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Value(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Value(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Value(value.to_string())
    }
}

impl From<u64> for OptionValue {
    fn from(value: u64) -> Self {
        Self::Value(value.to_string())
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        Self::Value(value.to_string())
    }
}

impl From<Vec<String>> for OptionValue {
    fn from(values: Vec<String>) -> Self {
        Self::Values(values)
    }
}

impl From<Vec<&str>> for OptionValue {
    fn from(values: Vec<&str>) -> Self {
        Self::Values(values.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for OptionValue {
    fn from(values: [&str; N]) -> Self {
        Self::Values(values.iter().map(|v| (*v).to_string()).collect())
    }
}

impl<const N: usize> From<[i64; N]> for OptionValue {
    fn from(values: [i64; N]) -> Self {
        Self::Values(values.iter().map(ToString::to_string).collect())
    }
}

/// A command to run on a host
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    base: String,
    args: Vec<String>,
    options: Vec<(String, OptionValue)>,
    stdin: Option<String>,
    stdout: Option<String>,
    stderr: Option<String>,
    interactive: bool,
}

impl Command {
    /// Creates a command running `base`
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            ..Self::default()
        }
    }

    /// Appends a positional argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends positional arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets a named option
    ///
    /// Options render in insertion order. Setting a name twice replaces the
    /// value and keeps the first position.
    #[must_use]
    pub fn opt(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.options.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.options.push((name, value));
        }
        self
    }

    /// Redirects standard input from `path`
    #[must_use]
    pub fn stdin(mut self, path: impl Into<String>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    /// Redirects standard output to `path`; a leading `+` appends
    #[must_use]
    pub fn stdout(mut self, path: impl Into<String>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    /// Redirects standard error to `path`; a leading `+` appends
    #[must_use]
    pub fn stderr(mut self, path: impl Into<String>) -> Self {
        self.stderr = Some(path.into());
        self
    }

    /// Requests interactive execution
    #[must_use]
    pub const fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Base program
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Positional arguments
    pub fn positional(&self) -> &[String] {
        &self.args
    }

    /// Named options in insertion order
    pub fn options(&self) -> &[(String, OptionValue)] {
        &self.options
    }

    /// Standard input redirect
    pub fn stdin_target(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    /// Standard output redirect
    pub fn stdout_target(&self) -> Option<&str> {
        self.stdout.as_deref()
    }

    /// Standard error redirect
    pub fn stderr_target(&self) -> Option<&str> {
        self.stderr.as_deref()
    }

    /// Whether interactive execution was requested
    pub const fn is_interactive(&self) -> bool {
        self.interactive
    }
}
