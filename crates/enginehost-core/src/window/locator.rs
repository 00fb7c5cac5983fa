//! Window discovery for a freshly spawned process.
//!
//! The engine needs a moment after spawn before its top-level window exists.
//! [`WindowLocator::find_window`] polls the window system on a tiered
//! schedule: a short interval for the first attempts, a longer one after
//! that, up to a fixed number of attempts.

use crate::cancel::CancellationToken;
use crate::error::{EmbedError, Result};
use crate::platform::{WindowHandle, WindowSystem};
use crate::process::ProcessExit;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Tiered poll cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Total number of polls, including the first.
    pub max_attempts: u32,
    /// Polls that are followed by `fast_interval`.
    pub fast_attempts: u32,
    pub fast_interval: Duration,
    pub slow_interval: Duration,
}

impl PollSchedule {
    pub fn new(
        max_attempts: u32,
        fast_attempts: u32,
        fast_interval: Duration,
        slow_interval: Duration,
    ) -> Self {
        Self {
            max_attempts,
            fast_attempts,
            fast_interval,
            slow_interval,
        }
    }

    /// Delay after the given attempt (1-based).
    pub fn interval_after(&self, attempt: u32) -> Duration {
        if attempt <= self.fast_attempts {
            self.fast_interval
        } else {
            self.slow_interval
        }
    }

    /// Total time spent sleeping when every attempt fails.
    ///
    /// No sleep follows the final attempt.
    pub fn ceiling(&self) -> Duration {
        let sleeps = self.max_attempts.saturating_sub(1);
        let fast = sleeps.min(self.fast_attempts);
        self.fast_interval * fast + self.slow_interval * (sleeps - fast)
    }
}

impl Default for PollSchedule {
    fn default() -> Self {
        crate::config::LifecycleOptions::default().poll_schedule()
    }
}

/// Finds the top-level window of a process.
pub struct WindowLocator {
    windows: Arc<dyn WindowSystem>,
    schedule: PollSchedule,
}

impl WindowLocator {
    pub fn new(windows: Arc<dyn WindowSystem>, schedule: PollSchedule) -> Self {
        Self { windows, schedule }
    }

    pub fn schedule(&self) -> &PollSchedule {
        &self.schedule
    }

    /// One enumeration pass.
    ///
    /// The first visible window owned by `pid` wins. Failing that, the
    /// process's main window is accepted once its owner is confirmed to be
    /// `pid`.
    pub fn poll_once(&self, pid: u32) -> Option<WindowHandle> {
        let windows = match self.windows.top_level_windows() {
            Ok(windows) => windows,
            Err(e) => {
                warn!("Window enumeration failed: {}", e);
                Vec::new()
            }
        };

        if let Some(found) = windows.iter().find(|w| w.pid == pid && w.visible) {
            return Some(found.handle);
        }

        self.windows
            .main_window(pid)
            .filter(|handle| !handle.is_null())
            .filter(|handle| self.windows.window_pid(*handle) == Some(pid))
    }

    /// Poll until a window of `pid` appears.
    ///
    /// Fails with `ProcessExited` as soon as `exit` reports the process
    /// gone, `Cancelled` as soon as `cancel` fires, and `DiscoveryTimeout`
    /// once the schedule is exhausted.
    pub async fn find_window(
        &self,
        pid: u32,
        mut exit: watch::Receiver<Option<ProcessExit>>,
        cancel: &CancellationToken,
    ) -> Result<WindowHandle> {
        let started = Instant::now();
        let max_attempts = self.schedule.max_attempts;

        for attempt in 1..=max_attempts {
            cancel.check()?;
            if exit.borrow_and_update().is_some() {
                return Err(EmbedError::ProcessExited { pid });
            }

            if let Some(handle) = self.poll_once(pid) {
                info!(
                    "Found window {} for process {} on attempt {}",
                    handle, pid, attempt
                );
                return Ok(handle);
            }
            debug!("No window for process {} yet (attempt {})", pid, attempt);

            if attempt == max_attempts {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.schedule.interval_after(attempt)) => {}
                _ = cancel.cancelled() => return Err(EmbedError::Cancelled),
                changed = exit.changed() => {
                    // A closed channel means the supervisor is gone with the process.
                    if changed.is_err() || exit.borrow().is_some() {
                        return Err(EmbedError::ProcessExited { pid });
                    }
                }
            }
        }

        let elapsed = started.elapsed();
        warn!(
            "No window for process {} after {} attempts ({:?})",
            pid, max_attempts, elapsed
        );
        Err(EmbedError::DiscoveryTimeout {
            pid,
            attempts: max_attempts,
            elapsed,
        })
    }
}
