//! `hostrun completions`: shell completion scripts.

use std::io::Write;

use clap::CommandFactory;
use clap_complete::{Shell, generate};

use crate::cli::Cli;
use crate::error::CliError;

/// Renders the completion script for `shell` into `out`
///
/// The script completes the name the binary is installed under, which is
/// the clap command name.
fn write_completions(shell: Shell, out: &mut dyn Write) -> Result<(), CliError> {
    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    tracing::debug!(%shell, %bin_name, "Generating completions");
    generate(shell, &mut cmd, bin_name, out);
    out.flush()?;
    Ok(())
}

/// Prints the completion script for `shell`
pub fn cmd_completions(shell: Shell) -> Result<(), CliError> {
    write_completions(shell, &mut std::io::stdout().lock())
}
