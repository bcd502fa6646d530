//! Local terminal control for interactive remote sessions

use std::io::{self, Read, Write};
use std::ops::{Deref, DerefMut};
use std::os::fd::{AsFd, BorrowedFd};

use nix::errno::Errno;
use nix::sys::termios::{self, SetArg, Termios};

use crate::error::HostResult;

/// The terminal an interactive session is attached to
pub trait Terminal: Send {
    /// Saves the current attributes and switches to raw mode
    ///
    /// # Errors
    ///
    /// Returns an error if the attributes cannot be read or written.
    fn enter_raw(&mut self) -> HostResult<()>;

    /// Restores the attributes saved by [`Self::enter_raw`]
    ///
    /// # Errors
    ///
    /// Returns an error if the attributes cannot be written.
    fn restore(&mut self) -> HostResult<()>;

    /// Descriptor to poll for user input, `None` when there is no input
    fn input_fd(&self) -> Option<BorrowedFd<'_>>;

    /// Reads available user input; 0 means the input is closed
    ///
    /// # Errors
    ///
    /// Returns the underlying IO error.
    fn read_input(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes session output to the user
    ///
    /// # Errors
    ///
    /// Returns the underlying IO error.
    fn write_output(&mut self, data: &[u8]) -> io::Result<()>;
}

/// The process's own stdin/stdout
pub struct StdTerminal {
    stdin: io::Stdin,
    stdout: io::Stdout,
    saved: Option<Termios>,
}

impl StdTerminal {
    /// Attaches to stdin and stdout
    #[must_use]
    pub fn new() -> Self {
        Self {
            stdin: io::stdin(),
            stdout: io::stdout(),
            saved: None,
        }
    }
}

impl Default for StdTerminal {
    fn default() -> Self {
        Self::new()
    }
}

impl Terminal for StdTerminal {
    fn enter_raw(&mut self) -> HostResult<()> {
        let original = match termios::tcgetattr(self.stdin.as_fd()) {
            Ok(attrs) => attrs,
            // Not a tty: nothing to switch.
            Err(Errno::ENOTTY) => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let mut raw = original.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(self.stdin.as_fd(), SetArg::TCSADRAIN, &raw)?;
        self.saved = Some(original);
        Ok(())
    }

    fn restore(&mut self) -> HostResult<()> {
        if let Some(saved) = self.saved.take() {
            termios::tcsetattr(self.stdin.as_fd(), SetArg::TCSADRAIN, &saved)?;
        }
        Ok(())
    }

    fn input_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.stdin.as_fd())
    }

    fn read_input(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdin.lock().read(buf)
    }

    fn write_output(&mut self, data: &[u8]) -> io::Result<()> {
        let mut out = self.stdout.lock();
        out.write_all(data)?;
        out.flush()
    }
}

/// Raw mode for as long as the guard lives
///
/// Attributes are restored on drop, including when the session ends with an
/// error or a panic unwinds through it.
pub struct RawModeGuard<'a, T: Terminal + ?Sized> {
    term: &'a mut T,
}

impl<'a, T: Terminal + ?Sized> RawModeGuard<'a, T> {
    /// Switches `term` to raw mode
    ///
    /// # Errors
    ///
    /// Returns an error if raw mode cannot be entered; the terminal is left
    /// untouched in that case.
    pub fn enter(term: &'a mut T) -> HostResult<Self> {
        term.enter_raw()?;
        Ok(Self { term })
    }
}

impl<T: Terminal + ?Sized> Deref for RawModeGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.term
    }
}

impl<T: Terminal + ?Sized> DerefMut for RawModeGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.term
    }
}

impl<T: Terminal + ?Sized> Drop for RawModeGuard<'_, T> {
    fn drop(&mut self) {
        if let Err(err) = self.term.restore() {
            tracing::error!(%err, "Failed to restore terminal attributes");
        }
    }
}
