//! Settings file model

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::controls::Controls;
use crate::error::{HostError, HostResult};
use crate::remote::connection::{DEFAULT_PORT, DEFAULT_USERNAME};
use crate::remote::{AuthMethod, ConnectOptions};

/// Everything stored in the configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Controls every new host starts with
    pub controls: Controls,
    /// Named remote hosts
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<HostProfile>,
}

impl Settings {
    /// Looks up a profile by name, exact match first, then ignoring case
    #[must_use]
    pub fn find_host(&self, name: &str) -> Option<&HostProfile> {
        self.hosts
            .iter()
            .find(|h| h.name == name)
            .or_else(|| self.hosts.iter().find(|h| h.name.eq_ignore_ascii_case(name)))
    }

    /// Checks that profiles have distinct names and an address
    ///
    /// # Errors
    ///
    /// Returns `HostError::Config` naming the first offending profile.
    pub fn validate(&self) -> HostResult<()> {
        let mut seen = HashSet::new();
        for host in &self.hosts {
            if host.name.trim().is_empty() {
                return Err(HostError::Config("host profile without a name".into()));
            }
            if host.address.trim().is_empty() {
                return Err(HostError::Config(format!(
                    "host profile '{}' has no address",
                    host.name
                )));
            }
            if !seen.insert(host.name.as_str()) {
                return Err(HostError::Config(format!(
                    "duplicate host profile '{}'",
                    host.name
                )));
            }
        }
        Ok(())
    }
}

/// A named remote host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostProfile {
    /// Name used on the command line
    pub name: String,
    /// Hostname or IP literal
    pub address: String,
    /// Login name
    pub username: String,
    /// SSH port
    pub port: u16,
    /// Private key; `~` and `$VARS` are expanded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
    /// Request agent forwarding
    pub forward_agent: bool,
    /// Connect over IPv6 when both families resolve
    pub prefer_ipv6: bool,
    /// Keep-alive interval in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keepalive_secs: Option<u32>,
}

impl Default for HostProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            address: String::new(),
            username: DEFAULT_USERNAME.to_string(),
            port: DEFAULT_PORT,
            identity_file: None,
            forward_agent: true,
            prefer_ipv6: false,
            keepalive_secs: None,
        }
    }
}

impl HostProfile {
    /// Profile for `address` with default settings
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            ..Self::default()
        }
    }

    /// Identity file with `~` and environment variables expanded
    ///
    /// # Errors
    ///
    /// Returns `HostError::Config` if a referenced variable is not set.
    pub fn identity_path(&self) -> HostResult<Option<PathBuf>> {
        self.identity_file
            .as_deref()
            .map(|raw| {
                shellexpand::full(raw)
                    .map(|expanded| PathBuf::from(expanded.as_ref()))
                    .map_err(|e| {
                        HostError::Config(format!("identity_file for '{}': {e}", self.name))
                    })
            })
            .transpose()
    }

    /// Connection options described by this profile
    ///
    /// An identity file selects key authentication; otherwise the agent and
    /// the usual key files are tried.
    ///
    /// # Errors
    ///
    /// Returns `HostError::Config` if the identity file cannot be expanded.
    pub fn to_connect_options(&self) -> HostResult<ConnectOptions> {
        let auth = match self.identity_path()? {
            Some(path) => AuthMethod::KeyFile {
                path,
                passphrase: None,
            },
            None => AuthMethod::Default,
        };
        Ok(ConnectOptions::new()
            .with_username(self.username.clone())
            .with_port(self.port)
            .with_forward_agent(self.forward_agent)
            .with_prefer_ipv6(self.prefer_ipv6)
            .with_keepalive(self.keepalive_secs)
            .with_auth(auth))
    }
}
