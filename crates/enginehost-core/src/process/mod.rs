//! Process management module.
//!
//! Launches the engine process, reads its output line by line and reports
//! its exit. The OS child handle is owned by a supervisor task; callers hold
//! a [`ManagedProcess`] that talks to it over channels.
//!
//! # Example
//!
//! ```rust,no_run
//! use enginehost_core::process::{LaunchSpec, ProcessLauncher};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> enginehost_core::Result<()> {
//!     let spec = LaunchSpec::new("/opt/godot/godot").with_arg("--version");
//!     let process = ProcessLauncher::launch(&spec).await?;
//!
//!     process.observe_output(|line| println!("[{}] {}", line.stream, line.line));
//!     if !process.wait_for_exit(Duration::from_secs(5)).await {
//!         process.kill();
//!     }
//!     Ok(())
//! }
//! ```

mod launcher;
mod managed;

pub use launcher::{resolve_executable, LaunchSpec, ProcessLauncher, ProcessSpawner};
pub use managed::{
    ManagedProcess, OutputLine, OutputStream, ProcessControl, ProcessDriver, ProcessExit,
    ProcessInfo,
};
