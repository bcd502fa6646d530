//! Rendering of a [`Command`] under a set of [`Controls`]

use std::collections::BTreeMap;
use std::path::Path;

use super::{APPEND_MARKER, Command, OptionValue, shell_quote};
use crate::controls::{Controls, OptionsPlace};

/// Variables set from the `locale` control
pub const LOCALE_VARS: [&str; 3] = ["LANG", "LANGUAGE", "LC_ALL"];

/// Shells that cannot take `VAR=value cmd` assignments directly
const ENV_KEYWORD_SHELLS: [&str; 3] = ["csh", "tcsh", "fish"];

/// A rendered command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedCommand {
    /// The line handed to `sh -c` or the remote exec request
    pub line: String,
    /// Whether the caller asked for interactive execution
    pub interactive: bool,
}

/// Renders `command` into a single shell line
///
/// Pure: the same command and controls always produce the same line.
pub fn format(command: &Command, controls: &Controls) -> FormattedCommand {
    let positional: Vec<String> = command
        .positional()
        .iter()
        .map(|arg| {
            if controls.escape_args {
                shell_quote(arg)
            } else {
                arg.clone()
            }
        })
        .collect();

    let mut tokens: Vec<String> = Vec::new();

    let env = environment(controls);
    if !env.is_empty() {
        if needs_env_keyword(controls.shell.as_deref()) {
            tokens.push("env".to_string());
        }
        tokens.extend(
            env.iter()
                .map(|(name, value)| format!("{name}={}", shell_quote(value))),
        );
    }

    tokens.push(command.base().to_string());

    if controls.options_place == OptionsPlace::After {
        tokens.extend(positional.iter().cloned());
    }

    for (name, value) in command.options() {
        if !value.is_enabled() {
            continue;
        }
        let flag = render_flag(name);
        let values = value.values();
        if values.is_empty() {
            if matches!(value, OptionValue::Flag(true)) {
                tokens.push(flag);
            }
            continue;
        }
        tokens.extend(
            values
                .iter()
                .filter(|v| !v.is_empty())
                .map(|v| format!("{flag} {v}")),
        );
    }

    if controls.options_place == OptionsPlace::Before {
        tokens.extend(positional);
    }

    let target = |path: &str| {
        if controls.escape_args {
            shell_quote(path)
        } else {
            path.to_string()
        }
    };
    if let Some(path) = command.stdin_target() {
        tokens.push(format!("< {}", target(path)));
    }
    if let Some(path) = command.stdout_target() {
        tokens.push(redirect("", path, &target));
    }
    if let Some(path) = command.stderr_target() {
        tokens.push(redirect("2", path, &target));
    }

    let mut line = tokens.join(" ");

    if let Some(shell) = &controls.shell {
        line = format!("{shell} -c {}", shell_quote(&line));
    }
    if let Some(user) = &controls.su {
        line = format!("su - {user} -c {}", shell_quote(&line));
    }

    FormattedCommand {
        line,
        interactive: command.is_interactive(),
    }
}

/// Locale variables merged with `envs`, sorted by name; `envs` wins
fn environment(controls: &Controls) -> BTreeMap<&str, &str> {
    let mut env = BTreeMap::new();
    if !controls.locale.is_empty() {
        for var in LOCALE_VARS {
            env.insert(var, controls.locale.as_str());
        }
    }
    for (name, value) in &controls.envs {
        env.insert(name.as_str(), value.as_str());
    }
    env
}

fn needs_env_keyword(shell: Option<&str>) -> bool {
    shell
        .and_then(|s| Path::new(s).file_name())
        .and_then(|name| name.to_str())
        .is_some_and(|name| ENV_KEYWORD_SHELLS.contains(&name))
}

fn render_flag(name: &str) -> String {
    if name.chars().count() == 1 {
        format!("-{name}")
    } else {
        format!("--{}", name.replace('_', "-"))
    }
}

fn redirect(fd: &str, path: &str, target: &impl Fn(&str) -> String) -> String {
    match path.strip_prefix(APPEND_MARKER) {
        Some(rest) => format!("{fd}>> {}", target(rest)),
        None => format!("{fd}> {}", target(path)),
    }
}
