//! Command execution: `exec`, `stream`, `shell` and `format`.

use std::io::Write;
use std::path::Path;

use hostrun_core::{Command, Host, StreamChunk};
use serde::Serialize;

use crate::cli::{ControlArgs, OutputFormat};
use crate::error::CliError;
use crate::util::{apply_controls, load_settings};

/// Login shell started by `hostrun shell`
const LOGIN_SHELL: &str = "exec \"${SHELL:-/bin/sh}\" -l";

/// JSON shape of a captured execution
#[derive(Debug, Serialize)]
struct ExecReport<'a> {
    command: &'a str,
    success: bool,
    exit_code: i32,
    stdout: String,
    stderr: String,
}

/// First word is the program, the rest are positional arguments
fn build_command(words: &[String]) -> Command {
    match words.split_first() {
        Some((program, args)) => Command::new(program.as_str()).args(args),
        None => Command::new("true"),
    }
}

/// Runs a command and prints what it captured
pub fn cmd_exec(
    host: &mut Host,
    words: &[String],
    interactive: bool,
    format: OutputFormat,
) -> Result<i32, CliError> {
    let command = build_command(words).interactive(interactive);
    let line = host.format(&command).line;
    tracing::debug!(%line, "Executing");
    let result = host.execute(&command)?;

    match format {
        OutputFormat::Plain => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(result.stdout.as_bytes())?;
            stdout.flush()?;
            std::io::stderr().write_all(result.stderr.as_bytes())?;
        }
        OutputFormat::Json => {
            let report = ExecReport {
                command: &line,
                success: result.success,
                exit_code: result.exit_code,
                stdout: result.stdout.text().into_owned(),
                stderr: result.stderr.text().into_owned(),
            };
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| CliError::Output(format!("Failed to serialize result: {e}")))?;
            println!("{json}");
        }
    }
    Ok(result.exit_code)
}

/// Runs a command and prints each line as soon as it arrives
pub fn cmd_stream(host: &mut Host, words: &[String]) -> Result<i32, CliError> {
    let command = build_command(words);
    let mut exit_code = 0;
    for chunk in host.stream(&command)? {
        match chunk? {
            StreamChunk::Stdout(line) => println!("{line}"),
            StreamChunk::Stderr(line) => eprintln!("{line}"),
            StreamChunk::Status {
                exit_code: code, ..
            } => exit_code = code,
        }
    }
    Ok(exit_code)
}

/// Attaches the terminal to a login shell
pub fn cmd_shell(host: &mut Host) -> Result<i32, CliError> {
    let result = host.interactive(&Command::new(LOGIN_SHELL))?;
    Ok(result.exit_code)
}

/// Prints the line `exec` would run, without connecting anywhere
pub fn cmd_format(
    config_path: Option<&Path>,
    controls: &ControlArgs,
    words: &[String],
) -> Result<(), CliError> {
    let settings = load_settings(config_path)?;
    let mut host = Host::local();
    host.set_controls(settings.controls);
    apply_controls(&mut host, controls)?;
    println!("{}", host.format(&build_command(words)).line);
    Ok(())
}
