//! Lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a [`LifecycleController`](super::LifecycleController) is in the
/// launch → locate → embed → run → stop sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LifecycleState {
    #[default]
    Idle,
    Launching,
    WaitingForWindow,
    Embedding,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl LifecycleState {
    /// States from which `Start` is accepted.
    pub const STARTABLE: [LifecycleState; 3] = [
        LifecycleState::Idle,
        LifecycleState::Stopped,
        LifecycleState::Failed,
    ];

    /// States in which a `Start` is still in progress.
    pub const STARTING: [LifecycleState; 3] = [
        LifecycleState::Launching,
        LifecycleState::WaitingForWindow,
        LifecycleState::Embedding,
    ];

    pub fn can_start(self) -> bool {
        Self::STARTABLE.contains(&self)
    }

    pub fn is_starting(self) -> bool {
        Self::STARTING.contains(&self)
    }

    /// Whether a process may be alive in this state.
    pub fn is_active(self) -> bool {
        self.is_starting() || matches!(self, LifecycleState::Running | LifecycleState::Stopping)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
