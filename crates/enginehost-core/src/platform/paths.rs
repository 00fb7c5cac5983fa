//! Platform-specific path utilities.
//!
//! This module provides functions to get platform-specific paths for:
//! - The engine host settings directory and the persisted engine path file
//! - The engine executable file names to probe for
//! - System install roots that commonly hold the engine

use crate::config::AppConfig;
use crate::error::{EmbedError, Result};
use std::path::{Path, PathBuf};

/// Get the engine host settings directory.
///
/// # Platform Behavior
/// - **Windows**: `%LOCALAPPDATA%\enginehost`
/// - **Linux**: `~/.local/share/enginehost` (XDG_DATA_HOME)
/// - **macOS**: `~/Library/Application Support/enginehost`
pub fn settings_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir().ok_or_else(|| EmbedError::Config {
        message: "Could not determine local data directory".to_string(),
    })?;
    Ok(data_dir.join(AppConfig::APP_DIR_NAME))
}

/// Get the path of the plain-text file holding the engine path override.
///
/// Returns `{settings_dir}/engine_path.txt`.
pub fn engine_path_file() -> Result<PathBuf> {
    Ok(settings_dir()?.join(AppConfig::ENGINE_PATH_FILE))
}

/// Engine executable file names to probe, most common spelling first.
///
/// # Platform Behavior
/// - **Windows**: `Godot.exe`, `godot.exe`
/// - **Linux/macOS**: `godot`
pub fn engine_executable_names() -> &'static [&'static str] {
    #[cfg(windows)]
    {
        &["Godot.exe", "godot.exe"]
    }
    #[cfg(not(windows))]
    {
        &["godot"]
    }
}

/// System install roots under which a `Godot` directory is probed.
///
/// # Platform Behavior
/// - **Windows**: `%ProgramFiles%` and `%LOCALAPPDATA%\Programs`
/// - **Linux/macOS**: `{data_local_dir}/Programs`; system binaries are
///   found through `PATH` instead
pub fn system_install_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();

    #[cfg(windows)]
    {
        if let Some(program_files) = std::env::var_os("ProgramFiles") {
            roots.push(PathBuf::from(program_files));
        }
    }

    if let Some(local) = dirs::data_local_dir() {
        roots.push(local.join("Programs"));
    }

    roots
}

/// Directories listed in `PATH`, in order.
pub fn path_dirs() -> Vec<PathBuf> {
    std::env::var_os("PATH")
        .map(|value| std::env::split_paths(&value).collect())
        .unwrap_or_default()
}

/// Directory containing the running executable, if it can be determined.
pub fn current_exe_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}
