//! Session lifecycle: one `start`/`stop` contract over launching, window
//! discovery, embedding and geometry synchronization.

mod controller;
mod events;
mod state;

pub use controller::{LaunchTarget, LifecycleController, StartRequest};
pub use events::LifecycleEvent;
pub use state::LifecycleState;
