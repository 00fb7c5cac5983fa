//! Window system for targets without an embedding backend.
//!
//! Queries report nothing; every mutation fails with `UnsupportedPlatform`.
//! Process launching and the lifecycle state machine keep working, so a
//! `Start` on these targets fails cleanly at discovery or embedding.

use super::current_platform;
use super::window::{Rect, Size, WindowHandle, WindowInfo, WindowStyle, WindowSystem};
use crate::error::{EmbedError, Result};

#[derive(Debug, Default)]
pub struct UnsupportedWindowSystem;

impl UnsupportedWindowSystem {
    pub fn new() -> Self {
        Self
    }

    fn unsupported<T>() -> Result<T> {
        Err(EmbedError::UnsupportedPlatform(current_platform()))
    }
}

impl WindowSystem for UnsupportedWindowSystem {
    fn top_level_windows(&self) -> Result<Vec<WindowInfo>> {
        Ok(Vec::new())
    }

    fn main_window(&self, _pid: u32) -> Option<WindowHandle> {
        None
    }

    fn window_pid(&self, _window: WindowHandle) -> Option<u32> {
        None
    }

    fn is_window(&self, _window: WindowHandle) -> bool {
        false
    }

    fn style(&self, _window: WindowHandle) -> Result<WindowStyle> {
        Self::unsupported()
    }

    fn set_style(&self, _window: WindowHandle, _style: WindowStyle) -> Result<()> {
        Self::unsupported()
    }

    fn set_parent(&self, _child: WindowHandle, _parent: Option<WindowHandle>) -> Result<()> {
        Self::unsupported()
    }

    fn show(&self, _window: WindowHandle, _visible: bool) -> Result<()> {
        Self::unsupported()
    }

    fn move_resize(&self, _window: WindowHandle, _rect: Rect) -> Result<()> {
        Self::unsupported()
    }

    fn window_rect(&self, _window: WindowHandle) -> Result<Rect> {
        Self::unsupported()
    }

    fn client_size(&self, _host: WindowHandle) -> Result<Size> {
        Self::unsupported()
    }

    fn screen_to_client(&self, _host: WindowHandle, _x: i32, _y: i32) -> Result<(i32, i32)> {
        Self::unsupported()
    }

    fn set_focus(&self, _window: WindowHandle) -> Result<()> {
        Self::unsupported()
    }

    fn post_key(&self, _window: WindowHandle, _key: u32, _down: bool) -> Result<()> {
        Self::unsupported()
    }
}
