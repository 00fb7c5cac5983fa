//! EngineHost Core - launch an external rendering engine and embed its
//! top-level window into a host application's surface.
//!
//! The crate is headless: the host application owns the surface and hands
//! its native handle to [`LifecycleController::start`]. The controller
//! launches the engine, polls for the window it creates, strips that
//! window's decorations, reparents it into the host and keeps it filling the
//! host until [`LifecycleController::stop`] tears everything down.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use enginehost_core::engine::default_project_root;
//! use enginehost_core::{
//!     EngineLaunch, ExecutableResolver, FileEnginePathStore, LifecycleController,
//!     LifecycleOptions, StartRequest, WindowHandle,
//! };
//!
//! #[tokio::main]
//! async fn main() -> enginehost_core::Result<()> {
//!     let store = Arc::new(FileEnginePathStore::default_location()?);
//!     let engine = ExecutableResolver::new(store).resolve()?;
//!     let project = default_project_root().expect("no project found");
//!
//!     let controller = LifecycleController::native(LifecycleOptions::default());
//!     let host = WindowHandle::from_raw(host_surface_handle());
//!     let pid = controller
//!         .start(StartRequest::engine(EngineLaunch::new(engine, project), host))
//!         .await?;
//!     println!("Engine {} embedded", pid);
//!
//!     controller.stop().await;
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod platform;
pub mod process;
pub mod window;

// Re-export commonly used types
pub use cancel::{CancellationToken, CancelledError};
pub use config::{AppConfig, DiscoveryTimeoutPolicy, LifecycleOptions, TimingConfig};
pub use engine::{EngineLaunch, ExecutableResolver, FileEnginePathStore};
pub use error::{EmbedError, FailureKind, Result};
pub use lifecycle::{
    LaunchTarget, LifecycleController, LifecycleEvent, LifecycleState, StartRequest,
};
pub use platform::{Rect, Size, WindowHandle, WindowSystem};
pub use process::{LaunchSpec, ManagedProcess, OutputLine, OutputStream, ProcessExit};
pub use window::{EmbeddedWindow, PollSchedule};
