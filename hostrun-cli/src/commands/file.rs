//! File commands: `cat`, `write`, `tail` and `ls`.

use std::io::{Read, Write};
use std::time::Duration;

use hostrun_core::Host;

use crate::error::CliError;

/// Copies a file from the host to stdout
pub fn cmd_cat(host: &mut Host, path: &str) -> Result<(), CliError> {
    let data = host.read(path)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&data)?;
    stdout.flush()?;
    Ok(())
}

/// Copies stdin into a file on the host
pub fn cmd_write(host: &mut Host, path: &str, append: bool) -> Result<(), CliError> {
    let mut data = Vec::new();
    std::io::stdin().read_to_end(&mut data)?;
    if append {
        host.append(path, &data)?;
    } else {
        host.write(path, &data)?;
    }
    tracing::info!(path, bytes = data.len(), append, "File written");
    Ok(())
}

/// Prints lines appended to a file until interrupted
pub fn cmd_tail(
    host: &mut Host,
    path: &str,
    interval_ms: u64,
    from_start: bool,
) -> Result<(), CliError> {
    let interval = Duration::from_millis(interval_ms.max(1));
    let follower = host.tail(path, interval);
    let follower = if from_start {
        follower
    } else {
        follower.skip_existing()
    };
    for line in follower {
        println!("{}", line?);
    }
    Ok(())
}

/// Lists a directory on the host
pub fn cmd_ls(host: &mut Host, path: &str) -> Result<(), CliError> {
    for entry in host.listdir(path)? {
        println!("{entry}");
    }
    Ok(())
}
