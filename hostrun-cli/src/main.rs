//! `hostrun` - run commands on the local machine or on remote hosts over SSH
//!
//! Provides commands for capturing, streaming and attaching to command
//! output, reading and writing files, following log files and listing
//! configured hosts.

mod cli;
mod commands;
mod error;
mod util;

use clap::Parser;
use cli::Cli;
use hostrun_core::tracing::{TracingConfig, TracingLevel, TracingOutput, init_tracing};

fn main() {
    let cli = Cli::parse();

    let level = if cli.quiet {
        TracingLevel::Error
    } else {
        TracingLevel::from_verbosity(cli.verbose)
    };
    let config = TracingConfig::new()
        .with_level(level)
        .with_output(TracingOutput::Stderr);
    if let Err(e) = init_tracing(&config) {
        eprintln!("Warning: {e}");
    }

    let quiet = cli.quiet;
    match commands::dispatch(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            if !quiet {
                eprintln!("Error: {e}");
            }
            std::process::exit(e.exit_code());
        }
    }
}
