//! Filesystem and system queries built on plain commands
//!
//! Each helper runs a standard Unix tool through [`Host::execute`], so it
//! works the same on the local machine and over SSH. Helpers run with
//! options before positionals, escaped arguments and UTF-8 decoding,
//! whatever the caller's controls say.

use crate::backend::ExecutionResult;
use crate::command::Command;
use crate::controls::ControlValue;
use crate::error::{HostError, HostResult};
use crate::host::Host;

fn helper_controls() -> [(&'static str, ControlValue); 3] {
    [
        ("options_place", ControlValue::from("before")),
        ("escape_args", ControlValue::from(true)),
        ("decode", ControlValue::from("utf-8")),
    ]
}

fn command_error(command: &str, message: impl Into<String>) -> HostError {
    HostError::Command {
        command: command.to_string(),
        stderr: message.into(),
    }
}

fn first_line(result: &ExecutionResult) -> Option<String> {
    result
        .stdout
        .text()
        .lines()
        .next()
        .map(|line| line.trim_end().to_string())
        .filter(|line| !line.is_empty())
}

impl Host {
    fn run_helper(&mut self, command: &Command) -> HostResult<ExecutionResult> {
        self.with_controls(helper_controls(), |host| host.execute(command))
    }

    /// Path queries on this host
    pub fn path(&mut self) -> HostPath<'_> {
        HostPath { host: self }
    }

    /// Entries of the directory at `path`, as printed by `ls`
    ///
    /// # Errors
    ///
    /// Returns `HostError::NotFound` or `HostError::NotADirectory` for a bad
    /// path and `HostError::Command` if `ls` fails.
    pub fn listdir(&mut self, path: &str) -> HostResult<Vec<String>> {
        if !self.path().exists(path)? {
            return Err(HostError::NotFound(path.to_string()));
        }
        if !self.path().is_dir(path)? {
            return Err(HostError::NotADirectory(path.to_string()));
        }
        let result = self.run_helper(&Command::new("ls").arg(path))?;
        if !result.success {
            return Err(command_error("ls", result.stderr.text().trim()));
        }
        Ok(result.stdout.lines())
    }

    /// Full path of `command`, as found by `which`
    ///
    /// # Errors
    ///
    /// Returns `HostError::Command` if the command is not on the `PATH`.
    pub fn which(&mut self, command: &str) -> HostResult<String> {
        let result = self.run_helper(&Command::new("which").arg(command))?;
        first_line(&result)
            .ok_or_else(|| command_error("which", format!("unable to find command '{command}'")))
    }

    /// Name reported by `hostname`
    ///
    /// # Errors
    ///
    /// Returns `HostError::Command` if `hostname` prints nothing.
    pub fn hostname(&mut self) -> HostResult<String> {
        let result = self.run_helper(&Command::new("hostname"))?;
        first_line(&result).ok_or_else(|| command_error("hostname", result.stderr.text().trim()))
    }

    /// Operating system name from `uname -s`, lowercased (`linux`, `darwin`)
    ///
    /// # Errors
    ///
    /// Returns `HostError::Command` if `uname` prints nothing.
    pub fn os_type(&mut self) -> HostResult<String> {
        let result = self.run_helper(&Command::new("uname").opt("s", true))?;
        first_line(&result)
            .map(|line| line.to_lowercase())
            .ok_or_else(|| command_error("uname", result.stderr.text().trim()))
    }

    /// Machine architecture from `uname -m`
    ///
    /// # Errors
    ///
    /// Returns `HostError::Command` if `uname` prints nothing.
    pub fn arch(&mut self) -> HostResult<String> {
        let result = self.run_helper(&Command::new("uname").opt("m", true))?;
        first_line(&result).ok_or_else(|| command_error("uname", result.stderr.text().trim()))
    }
}

/// Path queries bound to a host, see [`Host::path`]
pub struct HostPath<'a> {
    host: &'a mut Host,
}

impl HostPath<'_> {
    fn test(&mut self, flag: &str, path: &str) -> HostResult<bool> {
        let command = Command::new("test").opt(flag, true).arg(path);
        Ok(self.host.run_helper(&command)?.success)
    }

    /// `test -e`
    ///
    /// # Errors
    ///
    /// Returns an error only if the command could not be run.
    pub fn exists(&mut self, path: &str) -> HostResult<bool> {
        self.test("e", path)
    }

    /// `test -f`
    ///
    /// # Errors
    ///
    /// Returns an error only if the command could not be run.
    pub fn is_file(&mut self, path: &str) -> HostResult<bool> {
        self.test("f", path)
    }

    /// `test -d`
    ///
    /// # Errors
    ///
    /// Returns an error only if the command could not be run.
    pub fn is_dir(&mut self, path: &str) -> HostResult<bool> {
        self.test("d", path)
    }

    /// `test -L`
    ///
    /// # Errors
    ///
    /// Returns an error only if the command could not be run.
    pub fn is_link(&mut self, path: &str) -> HostResult<bool> {
        self.test("L", path)
    }

    /// Description printed by `file`, without the leading `path:`
    ///
    /// # Errors
    ///
    /// Returns `HostError::Command` if `file` fails. `file` reports its
    /// errors on standard output, so that is what the error carries.
    pub fn file_type(&mut self, path: &str) -> HostResult<String> {
        let result = self.host.run_helper(&Command::new("file").arg(path))?;
        let stdout = result.stdout.text();
        if !result.success {
            return Err(command_error("file", stdout.trim()));
        }
        Ok(stdout
            .rsplit(':')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    /// Disk usage of `path` in KiB, from `du -s -k`
    ///
    /// # Errors
    ///
    /// Returns `HostError::Command` if `du` fails or prints something that is
    /// not a size.
    pub fn size_kib(&mut self, path: &str) -> HostResult<u64> {
        let command = Command::new("du").opt("s", true).opt("k", true).arg(path);
        let result = self.host.run_helper(&command)?;
        if !result.success {
            return Err(command_error("du", result.stderr.text().trim()));
        }
        let stdout = result.stdout.text();
        let field = stdout.split('\t').next().unwrap_or_default().trim();
        field
            .parse()
            .map_err(|_| command_error("du", format!("unexpected output '{}'", stdout.trim())))
    }
}
