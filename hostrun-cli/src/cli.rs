//! CLI argument parsing types using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use crate::util::parse_key_val;

/// Run commands on the local machine or on remote hosts over SSH
#[derive(Parser)]
#[command(name = "hostrun")]
#[command(author, version, about = "Run commands locally or over SSH")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration directory
    #[arg(short, long, global = true, env = "HOSTRUN_CONFIG_DIR")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub controls: ControlArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where commands run
#[derive(Args, Debug, Default)]
pub struct TargetArgs {
    /// Remote host: a configured profile name, `host` or `user@host`.
    /// Without it, commands run locally
    #[arg(short = 'H', long, global = true)]
    pub host: Option<String>,

    /// Login name
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// SSH port
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Private key file
    #[arg(short, long, global = true, value_name = "PATH")]
    pub identity: Option<PathBuf>,

    /// Prompt for a password instead of using keys
    #[arg(long, global = true)]
    pub ask_password: bool,

    /// Do not forward the SSH agent
    #[arg(long, global = true)]
    pub no_agent_forwarding: bool,

    /// Prefer IPv6 when the host has both address families
    #[arg(short = '6', long, global = true)]
    pub ipv6: bool,
}

/// Overrides for the host controls
#[derive(Args, Debug, Default)]
pub struct ControlArgs {
    /// Abort commands after this many seconds
    #[arg(short, long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Run the command through this shell (`<shell> -c <command>`)
    #[arg(long, global = true)]
    pub shell: Option<String>,

    /// Run the command as this user (`su - <user> -c <command>`)
    #[arg(long, global = true, value_name = "USER")]
    pub su: Option<String>,

    /// Extra environment variable for the command (KEY=VALUE)
    #[arg(short, long = "env", global = true, value_parser = parse_key_val)]
    pub envs: Vec<(String, String)>,

    /// Locale exported to the command; empty to disable
    #[arg(long, global = true)]
    pub locale: Option<String>,

    /// Pass arguments to the shell unquoted
    #[arg(long, global = true)]
    pub no_escape: bool,

    /// Put positional arguments before named options
    #[arg(long, global = true)]
    pub options_after: bool,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a command and print its output
    #[command(about = "Run a command and print its captured output")]
    Exec {
        /// Attach the command to the terminal
        #[arg(short = 'T', long)]
        interactive: bool,

        /// Output format for the result
        #[arg(short, long, default_value = "plain", value_enum)]
        format: OutputFormat,

        /// Program to run followed by its arguments
        #[arg(required = true, trailing_var_arg = true, value_name = "COMMAND")]
        command: Vec<String>,
    },

    /// Run a command and print its output line by line as it arrives
    #[command(about = "Run a command and stream its output")]
    Stream {
        /// Program to run followed by its arguments
        #[arg(required = true, trailing_var_arg = true, value_name = "COMMAND")]
        command: Vec<String>,
    },

    /// Open an interactive shell
    #[command(about = "Open an interactive login shell on the host")]
    Shell,

    /// Print the command line that would run
    #[command(about = "Print the rendered command line without running it")]
    Format {
        /// Program to run followed by its arguments
        #[arg(required = true, trailing_var_arg = true, value_name = "COMMAND")]
        command: Vec<String>,
    },

    /// Print a file
    #[command(about = "Print a file from the host")]
    Cat {
        /// File path on the host
        path: String,
    },

    /// Write standard input to a file
    #[command(about = "Write standard input to a file on the host")]
    Write {
        /// File path on the host
        path: String,

        /// Append instead of replacing
        #[arg(short, long)]
        append: bool,
    },

    /// Follow a file
    #[command(about = "Print lines appended to a file, following rotation")]
    Tail {
        /// File path on the host
        path: String,

        /// Check interval in milliseconds
        #[arg(short = 'n', long, default_value = "1000")]
        interval: u64,

        /// Print existing content before following
        #[arg(long)]
        from_start: bool,
    },

    /// List a directory
    #[command(about = "List a directory on the host")]
    Ls {
        /// Directory path on the host
        path: String,
    },

    /// Show host facts
    #[command(about = "Show hostname, operating system and architecture")]
    Info {
        /// Output format
        #[arg(short, long, default_value = "plain", value_enum)]
        format: OutputFormat,
    },

    /// List configured hosts
    #[command(about = "List host profiles from the configuration")]
    Hosts {
        /// Output format
        #[arg(short, long, default_value = "plain", value_enum)]
        format: OutputFormat,
    },

    /// Generate shell completions
    #[command(about = "Generate shell completion scripts")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum, id = "completion_shell", value_name = "SHELL")]
        shell: Shell,
    },
}

/// Output format options
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human readable text
    #[default]
    Plain,
    /// JSON document
    Json,
}
