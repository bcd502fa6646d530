//! Command handler modules for the CLI.

mod completions;
mod exec;
mod file;
mod hosts;
mod info;

use std::path::Path;

use crate::cli::{Cli, Commands, ControlArgs, TargetArgs};
use crate::error::CliError;
use crate::util::open_session;

/// Dispatch a CLI command to the appropriate handler.
///
/// Returns the process exit code: the command's own status for `exec`,
/// `stream` and `shell`, 0 otherwise.
pub fn dispatch(cli: Cli) -> Result<i32, CliError> {
    let Cli {
        config,
        target,
        controls,
        command,
        ..
    } = cli;
    let config_path = config.as_deref();
    match command {
        Commands::Completions { shell } => completions::cmd_completions(shell).map(|()| 0),
        Commands::Hosts { format } => hosts::cmd_hosts(config_path, format).map(|()| 0),
        Commands::Format { command } => {
            exec::cmd_format(config_path, &controls, &command).map(|()| 0)
        }
        command => run_on_host(config_path, &target, &controls, command),
    }
}

fn run_on_host(
    config_path: Option<&Path>,
    target: &TargetArgs,
    controls: &ControlArgs,
    command: Commands,
) -> Result<i32, CliError> {
    let mut session = open_session(config_path, target, controls)?;
    tracing::info!(backend = session.backend_name(), "Session opened");

    match command {
        Commands::Exec {
            interactive,
            format,
            command,
        } => exec::cmd_exec(&mut session, &command, interactive, format),
        Commands::Stream { command } => exec::cmd_stream(&mut session, &command),
        Commands::Shell => exec::cmd_shell(&mut session),
        Commands::Cat { path } => file::cmd_cat(&mut session, &path).map(|()| 0),
        Commands::Write { path, append } => file::cmd_write(&mut session, &path, append).map(|()| 0),
        Commands::Tail {
            path,
            interval,
            from_start,
        } => file::cmd_tail(&mut session, &path, interval, from_start).map(|()| 0),
        Commands::Ls { path } => file::cmd_ls(&mut session, &path).map(|()| 0),
        Commands::Info { format } => info::cmd_info(&mut session, format).map(|()| 0),
        Commands::Completions { .. } | Commands::Hosts { .. } | Commands::Format { .. } => Ok(0),
    }
}
