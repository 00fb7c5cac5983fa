//! Error types for the engine host.
//!
//! Every failure the subsystem can surface is a variant of [`EmbedError`].
//! Callers that only care about the broad category (for an error dialog, or
//! to decide whether to offer manual executable selection) use
//! [`EmbedError::kind`].

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::lifecycle::LifecycleState;

/// Main error type for the engine host.
#[derive(Debug, Error)]
pub enum EmbedError {
    // Launch errors
    #[error("Engine executable not found: {}", .0.display())]
    ExecutableNotFound(PathBuf),

    #[error("Project file not found: {}", .0.display())]
    ProjectNotFound(PathBuf),

    #[error("Scene not found: {}", .0.display())]
    SceneNotFound(PathBuf),

    #[error("Failed to spawn {}: {}", .executable.display(), .message)]
    SpawnFailed {
        executable: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("process exited immediately (pid {pid}, code {code:?})")]
    ExitedImmediately { pid: u32, code: Option<i32> },

    // Discovery errors
    #[error("Process {pid} exited before its window appeared")]
    ProcessExited { pid: u32 },

    #[error("No window for process {pid} after {attempts} attempts ({elapsed:?})")]
    DiscoveryTimeout {
        pid: u32,
        attempts: u32,
        elapsed: Duration,
    },

    // Embedding errors
    #[error("Host surface is not a valid window: {handle:#x}")]
    HostNotReady { handle: isize },

    #[error("Embedding failed: {message}")]
    EmbedFailed { message: String },

    #[error("Window operation {op} failed: {message}")]
    WindowOp { op: &'static str, message: String },

    #[error("Position sync failed: {message}")]
    SyncFailed { message: String },

    // Lifecycle errors
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: LifecycleState,
    },

    #[error("Window embedding is not supported on {0}")]
    UnsupportedPlatform(&'static str),

    // File system and configuration errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for engine host operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Broad failure classification surfaced to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Executable, project or scene missing, or the OS rejected the spawn.
    Launch,
    /// No matching window appeared within the poll budget.
    DiscoveryTimeout,
    /// Reparenting or style changes were rejected, or the host was invalid.
    Embed,
    /// A single synchronizer tick failed. Never fatal.
    Sync,
    /// The engine terminated without being asked to.
    UnexpectedExit,
    /// `Stop` interrupted the operation.
    Cancelled,
    /// Anything else (I/O, configuration, misuse).
    Internal,
}

impl From<std::io::Error> for EmbedError {
    fn from(err: std::io::Error) -> Self {
        EmbedError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for EmbedError {
    fn from(err: serde_json::Error) -> Self {
        EmbedError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl EmbedError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        EmbedError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a window operation error.
    pub fn window_op(op: &'static str, message: impl Into<String>) -> Self {
        EmbedError::WindowOp {
            op,
            message: message.into(),
        }
    }

    /// Classify the error for presentation.
    pub fn kind(&self) -> FailureKind {
        match self {
            EmbedError::ExecutableNotFound(_)
            | EmbedError::ProjectNotFound(_)
            | EmbedError::SceneNotFound(_)
            | EmbedError::SpawnFailed { .. }
            | EmbedError::ExitedImmediately { .. } => FailureKind::Launch,

            EmbedError::DiscoveryTimeout { .. } => FailureKind::DiscoveryTimeout,

            // The engine died while we were still looking for its window.
            EmbedError::ProcessExited { .. } => FailureKind::Launch,

            EmbedError::HostNotReady { .. }
            | EmbedError::EmbedFailed { .. }
            | EmbedError::WindowOp { .. }
            | EmbedError::UnsupportedPlatform(_) => FailureKind::Embed,

            EmbedError::SyncFailed { .. } => FailureKind::Sync,

            EmbedError::Cancelled => FailureKind::Cancelled,

            EmbedError::InvalidState { .. }
            | EmbedError::Io { .. }
            | EmbedError::Json { .. }
            | EmbedError::Config { .. } => FailureKind::Internal,
        }
    }

    /// Check if a caller-initiated `Start` could reasonably succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbedError::DiscoveryTimeout { .. } | EmbedError::HostNotReady { .. }
        )
    }

    /// Check if the UI should offer manual executable selection.
    pub fn wants_executable_selection(&self) -> bool {
        matches!(
            self,
            EmbedError::ExecutableNotFound(_) | EmbedError::SpawnFailed { .. }
        )
    }
}
