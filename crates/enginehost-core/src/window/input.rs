//! Keyboard forwarding to the embedded window.

use crate::error::Result;
use crate::platform::{WindowHandle, WindowSystem};
use std::sync::Arc;
use tracing::debug;

pub struct InputForwarder {
    windows: Arc<dyn WindowSystem>,
}

impl InputForwarder {
    pub fn new(windows: Arc<dyn WindowSystem>) -> Self {
        Self { windows }
    }

    /// Give `window` keyboard focus.
    pub fn focus(&self, window: WindowHandle) -> Result<()> {
        debug!("Focusing window {}", window);
        self.windows.set_focus(window)
    }

    /// Post a virtual-key down or up message to `window`.
    pub fn send_key(&self, window: WindowHandle, key: u32, down: bool) -> Result<()> {
        self.windows.post_key(window, key, down)
    }
}
