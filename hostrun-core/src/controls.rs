//! Named controls that govern command formatting and execution
//!
//! Controls are a fixed set of options with defaults. They can be read and
//! written by name, and overridden for the duration of a scope: the previous
//! mapping is restored when the scope ends, whatever way it ends.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HostError, HostResult};

/// Locale injected into every command line by default
pub const DEFAULT_LOCALE: &str = "en_US.UTF-8";

/// Every recognized control name
pub const CONTROL_NAMES: [&str; 8] = [
    "options_place",
    "locale",
    "decode",
    "envs",
    "timeout",
    "escape_args",
    "shell",
    "su",
];

/// Where positional arguments go relative to named options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionsPlace {
    /// `cmd --opt value arg`
    #[default]
    Before,
    /// `cmd arg --opt value`
    After,
}

impl FromStr for OptionsPlace {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before" => Ok(Self::Before),
            "after" => Ok(Self::After),
            other => Err(HostError::Config(format!(
                "invalid options_place '{other}' (expected 'before' or 'after')"
            ))),
        }
    }
}

impl fmt::Display for OptionsPlace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Before => write!(f, "before"),
            Self::After => write!(f, "after"),
        }
    }
}

/// Decoding applied to captured output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Decode {
    /// Decode as UTF-8, replacing invalid sequences
    #[default]
    Utf8,
    /// Keep raw bytes
    Raw,
}

impl FromStr for Decode {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" => Ok(Self::Raw),
            "utf-8" | "utf8" => Ok(Self::Utf8),
            other => Err(HostError::Config(format!(
                "unsupported decode '{other}' (expected 'utf-8' or empty)"
            ))),
        }
    }
}

impl TryFrom<String> for Decode {
    type Error = HostError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Decode> for String {
    fn from(value: Decode) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Decode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Utf8 => write!(f, "utf-8"),
            Self::Raw => Ok(()),
        }
    }
}

/// Dynamically typed value for by-name access
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlValue {
    /// Text value (`options_place`, `locale`, `decode`, `shell`, `su`)
    Text(String),
    /// Boolean value (`escape_args`)
    Bool(bool),
    /// Numeric value (`timeout`)
    Number(u64),
    /// Mapping (`envs`)
    Map(BTreeMap<String, String>),
    /// No value (`shell`, `su` when unset)
    Unset,
}

impl From<&str> for ControlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ControlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for ControlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u64> for ControlValue {
    fn from(value: u64) -> Self {
        Self::Number(value)
    }
}

impl From<u32> for ControlValue {
    fn from(value: u32) -> Self {
        Self::Number(u64::from(value))
    }
}

impl From<BTreeMap<String, String>> for ControlValue {
    fn from(value: BTreeMap<String, String>) -> Self {
        Self::Map(value)
    }
}

impl From<Option<String>> for ControlValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Unset, Self::Text)
    }
}

impl fmt::Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Map(map) => {
                let pairs: Vec<String> = map.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "{}", pairs.join(","))
            }
            Self::Unset => Ok(()),
        }
    }
}

/// The control mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Controls {
    /// Positional arguments before or after named options
    pub options_place: OptionsPlace,
    /// Locale exported to the command; empty disables injection
    pub locale: String,
    /// Decoding of captured output
    pub decode: Decode,
    /// Extra environment assignments
    pub envs: BTreeMap<String, String>,
    /// Seconds before a blocking execution is aborted (0 = never)
    pub timeout: u64,
    /// Shell-escape positional arguments
    pub escape_args: bool,
    /// Wrap the command as `<shell> -c <command>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    /// Wrap the command as `su - <user> -c <command>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub su: Option<String>,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            options_place: OptionsPlace::Before,
            locale: DEFAULT_LOCALE.to_string(),
            decode: Decode::Utf8,
            envs: BTreeMap::new(),
            timeout: 0,
            escape_args: true,
            shell: None,
            su: None,
        }
    }
}

impl Controls {
    /// Creates controls with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `name` is a recognized control
    #[must_use]
    pub fn is_control(name: &str) -> bool {
        CONTROL_NAMES.contains(&name)
    }

    /// Reads a control by name
    ///
    /// # Errors
    ///
    /// Returns `HostError::Config` for an unknown name.
    pub fn get(&self, name: &str) -> HostResult<ControlValue> {
        let value = match name {
            "options_place" => ControlValue::Text(self.options_place.to_string()),
            "locale" => ControlValue::Text(self.locale.clone()),
            "decode" => ControlValue::Text(self.decode.to_string()),
            "envs" => ControlValue::Map(self.envs.clone()),
            "timeout" => ControlValue::Number(self.timeout),
            "escape_args" => ControlValue::Bool(self.escape_args),
            "shell" => self.shell.clone().into(),
            "su" => self.su.clone().into(),
            other => return Err(unknown_control(other)),
        };
        Ok(value)
    }

    /// Writes a control by name
    ///
    /// # Errors
    ///
    /// Returns `HostError::Config` for an unknown name or a value of the
    /// wrong type. The mapping is unchanged on error.
    pub fn set(&mut self, name: &str, value: impl Into<ControlValue>) -> HostResult<()> {
        let value = value.into();
        match (name, value) {
            ("options_place", ControlValue::Text(s)) => self.options_place = s.parse()?,
            ("locale", ControlValue::Text(s)) => self.locale = s,
            ("locale", ControlValue::Unset) => self.locale.clear(),
            ("decode", ControlValue::Text(s)) => self.decode = s.parse()?,
            ("decode", ControlValue::Unset) => self.decode = Decode::Raw,
            ("envs", ControlValue::Map(map)) => self.envs = map,
            ("timeout", ControlValue::Number(n)) => self.timeout = n,
            ("timeout", ControlValue::Text(s)) => {
                self.timeout = s.trim().parse().map_err(|_| {
                    HostError::Config(format!("invalid timeout '{s}' (expected seconds)"))
                })?;
            }
            ("escape_args", ControlValue::Bool(b)) => self.escape_args = b,
            ("shell", ControlValue::Text(s)) => self.shell = non_empty(s),
            ("shell", ControlValue::Unset) => self.shell = None,
            ("su", ControlValue::Text(s)) => self.su = non_empty(s),
            ("su", ControlValue::Unset) => self.su = None,
            (name, value) if Self::is_control(name) => {
                return Err(HostError::Config(format!(
                    "invalid value '{value}' for control '{name}'"
                )));
            }
            (name, _) => return Err(unknown_control(name)),
        }
        Ok(())
    }

    /// Applies several overrides, all or nothing
    ///
    /// # Errors
    ///
    /// Returns the first `HostError::Config` encountered; in that case no
    /// override is applied.
    pub fn apply<I, K, V>(&mut self, overrides: I) -> HostResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ControlValue>,
    {
        let mut next = self.clone();
        for (name, value) in overrides {
            next.set(name.as_ref(), value)?;
        }
        *self = next;
        Ok(())
    }

    /// Timeout as a duration, `None` when disabled
    #[must_use]
    pub const fn timeout_duration(&self) -> Option<Duration> {
        if self.timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout))
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

fn unknown_control(name: &str) -> HostError {
    HostError::Config(format!("invalid control '{name}'"))
}

/// Anything that owns a [`Controls`] mapping
pub trait HasControls {
    /// Mutable access to the mapping
    fn controls_mut(&mut self) -> &mut Controls;
}

impl HasControls for Controls {
    fn controls_mut(&mut self) -> &mut Controls {
        self
    }
}

/// Scoped override of a [`Controls`] mapping
///
/// Dereferences to the owner. The captured mapping is written back on drop,
/// which also runs during unwinding, so nested scopes restore layer by layer.
pub struct Scoped<'a, T: HasControls + ?Sized> {
    owner: &'a mut T,
    saved: Controls,
}

impl<'a, T: HasControls + ?Sized> Scoped<'a, T> {
    /// Applies `overrides` to `owner` until the returned guard is dropped
    ///
    /// # Errors
    ///
    /// Returns `HostError::Config` if any override is invalid; nothing is
    /// applied in that case.
    pub fn new<I, K, V>(owner: &'a mut T, overrides: I) -> HostResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ControlValue>,
    {
        let saved = owner.controls_mut().clone();
        owner.controls_mut().apply(overrides)?;
        Ok(Self { owner, saved })
    }

    /// The mapping that will be restored
    #[must_use]
    pub const fn saved(&self) -> &Controls {
        &self.saved
    }
}

impl<T: HasControls + ?Sized> Deref for Scoped<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.owner
    }
}

impl<T: HasControls + ?Sized> DerefMut for Scoped<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.owner
    }
}

impl<T: HasControls + ?Sized> Drop for Scoped<'_, T> {
    fn drop(&mut self) {
        *self.owner.controls_mut() = std::mem::take(&mut self.saved);
    }
}

impl<T: HasControls + ?Sized> fmt::Debug for Scoped<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scoped").field("saved", &self.saved).finish()
    }
}
