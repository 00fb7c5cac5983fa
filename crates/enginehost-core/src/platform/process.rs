//! Platform-specific process control.
//!
//! This module provides cross-platform abstractions for checking whether a
//! process is alive and for asking it to exit on its own. Forced termination
//! goes through the child handle owned by the launcher instead.

use crate::error::Result;
use tracing::{debug, warn};

/// Check if a process with the given PID is alive.
///
/// # Platform Behavior
/// - **Linux/macOS**: `kill(pid, 0)` existence check
/// - **Windows**: `OpenProcess` + `GetExitCodeProcess` != `STILL_ACTIVE`
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        kill(Pid::from_raw(raw), None).is_ok()
    }

    #[cfg(windows)]
    {
        super::windows::is_process_alive(pid)
    }

    #[cfg(not(any(unix, windows)))]
    {
        warn!("Process alive check not implemented for this platform");
        true
    }
}

/// Ask a process to exit gracefully.
///
/// # Platform Behavior
/// - **Linux/macOS**: Sends SIGTERM
/// - **Windows**: Posts `WM_CLOSE` to every top-level window of the process,
///   the same request a user closing the window would make
///
/// # Returns
/// `true` if a request was delivered, `false` if the process was already gone
/// (or, on Windows, owns no window to close).
pub fn request_graceful_exit(pid: u32) -> Result<bool> {
    if !is_process_alive(pid) {
        debug!("Process {} is not running", pid);
        return Ok(false);
    }

    #[cfg(unix)]
    {
        use crate::error::EmbedError;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid)
            .map_err(|_| EmbedError::Config {
                message: format!("pid {} out of range", pid),
            })?;

        debug!("Sending SIGTERM to process {}", pid);
        match kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) => Ok(true),
            Err(nix::errno::Errno::ESRCH) => Ok(false),
            Err(e) => {
                warn!("Failed to send SIGTERM to {}: {}", pid, e);
                Err(EmbedError::Io {
                    message: format!("SIGTERM to {} failed: {}", pid, e),
                    path: None,
                    source: None,
                })
            }
        }
    }

    #[cfg(windows)]
    {
        let closed = super::windows::post_close_to_process(pid);
        if closed == 0 {
            warn!("Process {} has no window to close", pid);
        } else {
            debug!("Posted WM_CLOSE to {} window(s) of process {}", closed, pid);
        }
        Ok(closed > 0)
    }

    #[cfg(not(any(unix, windows)))]
    {
        Err(crate::error::EmbedError::UnsupportedPlatform(
            super::current_platform(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_process_alive_self() {
        let pid = std::process::id();
        assert!(is_process_alive(pid));
    }

    #[test]
    fn test_is_process_alive_nonexistent() {
        assert!(!is_process_alive(4_000_000_000));
    }

    #[test]
    fn test_graceful_exit_nonexistent() {
        let result = request_graceful_exit(4_000_000_000);
        assert!(matches!(result, Ok(false)));
    }
}
