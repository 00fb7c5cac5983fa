//! Platform abstraction layer for cross-platform compatibility.
//!
//! This module centralizes all platform-specific code to make it easy to find,
//! maintain, and extend. All `#[cfg]` blocks for OS-specific behavior should
//! live in this module rather than scattered throughout the codebase.
//!
//! # Architecture
//!
//! Each submodule handles a specific cross-platform concern:
//! - `paths` - Settings location, engine executable names, install roots
//! - `process` - Liveness checks and graceful exit requests
//! - `window` - The [`WindowSystem`] capability and its value types
//!
//! # Supported Platforms
//!
//! - **Windows**: Full support, including window embedding
//! - **Linux/macOS**: Process control and path resolution; window embedding
//!   reports `UnsupportedPlatform`

pub mod paths;
pub mod process;
pub mod window;

mod unsupported;
#[cfg(windows)]
mod windows;

#[cfg(test)]
pub(crate) mod fake;

use std::sync::Arc;

pub use process::{is_process_alive, request_graceful_exit};
pub use unsupported::UnsupportedWindowSystem;
pub use window::{Rect, Size, WindowHandle, WindowInfo, WindowStyle, WindowSystem};
#[cfg(windows)]
pub use windows::Win32WindowSystem;

/// The window system for the current target.
pub fn native_window_system() -> Arc<dyn WindowSystem> {
    #[cfg(windows)]
    {
        Arc::new(Win32WindowSystem::new())
    }
    #[cfg(not(windows))]
    {
        Arc::new(UnsupportedWindowSystem::new())
    }
}

/// Returns the current platform name.
pub fn current_platform() -> &'static str {
    #[cfg(target_os = "linux")]
    {
        "linux"
    }
    #[cfg(target_os = "windows")]
    {
        "windows"
    }
    #[cfg(target_os = "macos")]
    {
        "macos"
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    {
        "unknown"
    }
}

/// Returns true if window embedding is available on this platform.
pub fn supports_embedding() -> bool {
    cfg!(windows)
}
