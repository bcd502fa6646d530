//! Deadline enforcement for blocking host operations
//!
//! A [`TimeoutGuard`] arms a watchdog thread for the configured number of
//! seconds. When the deadline passes, the watchdog runs the registered
//! interrupt action (kill the child's process group, shut down the SSH
//! socket). That action is what unblocks the operation; the guard then maps
//! whatever the operation returned into [`HostError::Timeout`].
//!
//! Dropping the guard disarms and joins the watchdog, so no timer outlives
//! the call it protects.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::{HostError, HostResult};

/// Action run by the watchdog when the deadline passes
pub type InterruptAction = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct WatchState {
    disarmed: bool,
    expired: bool,
    action: Option<InterruptAction>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<WatchState>,
    wakeup: Condvar,
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Timeout state mutex was poisoned, recovering inner value");
            poisoned.into_inner()
        }
    }
}

/// Scoped deadline around one host operation
pub struct TimeoutGuard {
    seconds: u64,
    deadline: Option<Instant>,
    shared: Arc<Shared>,
    watchdog: Option<JoinHandle<()>>,
}

impl TimeoutGuard {
    /// A guard that never expires
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            seconds: 0,
            deadline: None,
            shared: Arc::new(Shared::default()),
            watchdog: None,
        }
    }

    /// Arms a guard for `seconds`; zero returns a guard that never expires
    ///
    /// # Errors
    ///
    /// Returns `HostError::Io` if the watchdog thread cannot be spawned.
    pub fn arm(seconds: u64) -> HostResult<Self> {
        if seconds == 0 {
            return Ok(Self::disabled());
        }
        let deadline = Instant::now() + Duration::from_secs(seconds);
        let shared = Arc::new(Shared::default());
        let watch = Arc::clone(&shared);
        let watchdog = std::thread::Builder::new()
            .name("hostrun-timeout".to_string())
            .spawn(move || watch_until(&watch, deadline, seconds))?;
        tracing::trace!(seconds, "Timeout armed");
        Ok(Self {
            seconds,
            deadline: Some(deadline),
            shared,
            watchdog: Some(watchdog),
        })
    }

    /// Registers the interrupt action, replacing any previous one
    ///
    /// If the deadline has already passed the action runs immediately.
    pub fn on_expiry(&self, action: InterruptAction) {
        if self.deadline.is_none() {
            return;
        }
        let mut state = lock_or_recover(&self.shared.state);
        if state.expired {
            drop(state);
            action();
        } else {
            state.action = Some(action);
        }
    }

    /// Configured deadline in seconds, 0 when disabled
    pub const fn seconds(&self) -> u64 {
        self.seconds
    }

    /// Returns true once the deadline has passed
    pub fn expired(&self) -> bool {
        match self.deadline {
            None => false,
            Some(deadline) => {
                lock_or_recover(&self.shared.state).expired || Instant::now() >= deadline
            }
        }
    }

    /// Time left before expiry, `None` when disabled
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Caps a poll wait so it never sleeps past the deadline
    pub fn clamp(&self, wait: Duration) -> Duration {
        self.remaining().map_or(wait, |left| wait.min(left))
    }

    /// Fails with `HostError::Timeout` once the deadline has passed
    ///
    /// # Errors
    ///
    /// Returns `HostError::Timeout` after expiry.
    pub fn check(&self) -> HostResult<()> {
        if self.expired() {
            Err(HostError::Timeout {
                seconds: self.seconds,
            })
        } else {
            Ok(())
        }
    }

    /// Maps the outcome of the guarded operation
    ///
    /// After expiry every outcome becomes `HostError::Timeout`: the interrupt
    /// action is what made the operation return, so its result is not
    /// meaningful.
    ///
    /// # Errors
    ///
    /// Returns `HostError::Timeout` after expiry, otherwise `result` as is.
    pub fn finish<T>(self, result: HostResult<T>) -> HostResult<T> {
        let seconds = self.seconds;
        let timed_out = self.deadline.is_some() && lock_or_recover(&self.shared.state).expired;
        drop(self);
        if timed_out {
            Err(HostError::Timeout { seconds })
        } else {
            result
        }
    }
}

fn watch_until(shared: &Shared, deadline: Instant, seconds: u64) {
    let mut state = lock_or_recover(&shared.state);
    loop {
        if state.disarmed {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            state.expired = true;
            let action = state.action.take();
            drop(state);
            tracing::warn!(seconds, "Deadline reached, interrupting operation");
            if let Some(action) = action {
                action();
            }
            return;
        }
        state = match shared.wakeup.wait_timeout(state, deadline - now) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        };
    }
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.watchdog.take() {
            lock_or_recover(&self.shared.state).disarmed = true;
            self.shared.wakeup.notify_all();
            if handle.join().is_err() {
                tracing::warn!("Timeout watchdog panicked");
            }
        }
    }
}

impl std::fmt::Debug for TimeoutGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutGuard")
            .field("seconds", &self.seconds)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
