//! Shared utility functions used across command modules.

use std::path::Path;

use hostrun_core::config::{ConfigManager, Settings};
use hostrun_core::{AuthMethod, ConnectOptions, Host, Session};
use secrecy::SecretString;

use crate::cli::{ControlArgs, TargetArgs};
use crate::error::CliError;

/// Creates a `ConfigManager` using the optional custom config directory
/// from CLI args.
pub fn create_config_manager(config_path: Option<&Path>) -> Result<ConfigManager, CliError> {
    match config_path {
        Some(path) => Ok(ConfigManager::with_config_dir(path.to_path_buf())),
        None => ConfigManager::new()
            .map_err(|e| CliError::Config(format!("Failed to initialize config: {e}"))),
    }
}

/// Loads settings from the configuration directory
pub fn load_settings(config_path: Option<&Path>) -> Result<Settings, CliError> {
    create_config_manager(config_path)?
        .load_settings()
        .map_err(|e| CliError::Config(format!("Failed to load settings: {e}")))
}

/// Parse a KEY=value pair
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=value: no `=` found in `{s}`"))?;
    if pos == 0 {
        return Err(format!("invalid KEY=value: empty key in `{s}`"));
    }
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Splits `user@host` into its parts
pub fn split_destination(destination: &str) -> (Option<&str>, &str) {
    match destination.rsplit_once('@') {
        Some((user, host)) if !user.is_empty() => (Some(user), host),
        _ => (None, destination),
    }
}

/// Address and connection options for `--host`
///
/// A configured profile is used when the name matches one; flags given on
/// the command line win over the profile.
pub fn resolve_target(
    settings: &Settings,
    target: &TargetArgs,
    destination: &str,
) -> Result<(String, ConnectOptions), CliError> {
    let (address, mut options, profile_user) = match settings.find_host(destination) {
        Some(profile) => {
            tracing::debug!(profile = %profile.name, "Using host profile");
            (profile.address.clone(), profile.to_connect_options()?, None)
        }
        None => {
            let (user, host) = split_destination(destination);
            (host.to_string(), ConnectOptions::new(), user)
        }
    };

    if let Some(user) = target.user.as_deref().or(profile_user) {
        options = options.with_username(user);
    }
    if let Some(port) = target.port {
        options = options.with_port(port);
    }
    if target.no_agent_forwarding {
        options = options.with_forward_agent(false);
    }
    if target.ipv6 {
        options = options.with_prefer_ipv6(true);
    }
    if let Some(path) = &target.identity {
        options = options.with_auth(AuthMethod::KeyFile {
            path: path.clone(),
            passphrase: None,
        });
    }
    if target.ask_password {
        eprint!("Password for {}@{address}: ", options.username);
        let password = rpassword::read_password()
            .map_err(|e| CliError::Config(format!("Failed to read password: {e}")))?;
        options = options.with_auth(AuthMethod::Password(SecretString::from(password)));
    }
    Ok((address, options))
}

/// Applies command-line control overrides on top of the configured ones
pub fn apply_controls(host: &mut Host, args: &ControlArgs) -> Result<(), CliError> {
    if let Some(timeout) = args.timeout {
        host.set_control("timeout", timeout)?;
    }
    if let Some(shell) = &args.shell {
        host.set_control("shell", shell.as_str())?;
    }
    if let Some(user) = &args.su {
        host.set_control("su", user.as_str())?;
    }
    if let Some(locale) = &args.locale {
        host.set_control("locale", locale.as_str())?;
    }
    if args.no_escape {
        host.set_control("escape_args", false)?;
    }
    if args.options_after {
        host.set_control("options_place", "after")?;
    }
    let envs = &mut host.controls_mut().envs;
    for (key, value) in &args.envs {
        envs.insert(key.clone(), value.clone());
    }
    Ok(())
}

/// Opens the host selected by the command line
///
/// The session disconnects when dropped.
pub fn open_session(
    config_path: Option<&Path>,
    target: &TargetArgs,
    controls: &ControlArgs,
) -> Result<Session, CliError> {
    let settings = load_settings(config_path)?;
    let mut host = match target.host.as_deref() {
        None => Host::local(),
        Some(destination) => {
            let (address, options) = resolve_target(&settings, target, destination)?;
            Host::connect(&address, &options)?
        }
    };
    host.set_controls(settings.controls);
    apply_controls(&mut host, controls)?;
    Ok(Session::from_host(host))
}
