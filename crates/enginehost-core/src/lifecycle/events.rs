//! Notifications published by the lifecycle controller.

use super::state::LifecycleState;
use crate::error::FailureKind;
use crate::process::{OutputLine, ProcessExit};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    StateChanged {
        from: LifecycleState,
        to: LifecycleState,
    },
    /// A line of engine output.
    Output { pid: u32, line: OutputLine },
    /// `Start` failed; the same error was returned to its caller.
    StartFailed { kind: FailureKind, message: String },
    /// The engine process ended. Sent exactly once per process.
    ///
    /// `unexpected` is set when the process ended on its own while running.
    ProcessStopped {
        pid: u32,
        exit: ProcessExit,
        unexpected: bool,
    },
}

impl LifecycleEvent {
    /// Whether this is an unexpected-exit notification.
    pub fn is_unexpected_exit(&self) -> bool {
        matches!(
            self,
            LifecycleEvent::ProcessStopped {
                unexpected: true,
                ..
            }
        )
    }
}
