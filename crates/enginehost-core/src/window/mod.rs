//! Locating, embedding and tracking the engine window.
//!
//! - [`WindowLocator`] polls for the top-level window of a process
//! - [`WindowEmbedder`] reparents it into the host and owns its geometry
//! - [`PositionSynchronizer`] corrects drift on a timer while running
//! - [`InputForwarder`] sends focus and key messages to it

mod embedder;
mod input;
mod locator;
mod sync;

pub use embedder::{EmbeddedWindow, WindowEmbedder};
pub use input::InputForwarder;
pub use locator::{PollSchedule, WindowLocator};
pub use sync::PositionSynchronizer;
