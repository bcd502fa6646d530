//! Host facts.

use hostrun_core::Host;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct HostInfo {
    backend: &'static str,
    hostname: String,
    os_type: String,
    arch: String,
}

/// Prints hostname, operating system and architecture
pub fn cmd_info(host: &mut Host, format: OutputFormat) -> Result<(), CliError> {
    let info = HostInfo {
        backend: host.backend_name(),
        hostname: host.hostname()?,
        os_type: host.os_type()?,
        arch: host.arch()?,
    };

    match format {
        OutputFormat::Plain => {
            println!("Backend:  {}", info.backend);
            println!("Hostname: {}", info.hostname);
            println!("OS:       {}", info.os_type);
            println!("Arch:     {}", info.arch);
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&info)
                .map_err(|e| CliError::Output(format!("Failed to serialize info: {e}")))?;
            println!("{json}");
        }
    }
    Ok(())
}
