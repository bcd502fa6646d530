//! Configured host profiles.

use std::path::Path;

use crate::cli::OutputFormat;
use crate::error::CliError;
use crate::util::load_settings;

/// Lists host profiles
pub fn cmd_hosts(config_path: Option<&Path>, format: OutputFormat) -> Result<(), CliError> {
    let settings = load_settings(config_path)?;

    match format {
        OutputFormat::Plain => {
            if settings.hosts.is_empty() {
                println!("No hosts configured.");
                return Ok(());
            }
            let width = settings
                .hosts
                .iter()
                .map(|h| h.name.len())
                .max()
                .unwrap_or(4)
                .max(4);
            println!("{:<width$}  ADDRESS", "NAME");
            for host in &settings.hosts {
                println!(
                    "{:<width$}  {}@{}:{}",
                    host.name, host.username, host.address, host.port
                );
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&settings.hosts)
                .map_err(|e| CliError::Output(format!("Failed to serialize hosts: {e}")))?;
            println!("{json}");
        }
    }
    Ok(())
}
