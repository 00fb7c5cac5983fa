//! Windowing capability used by discovery, embedding and synchronization.
//!
//! Everything above this module talks to the OS through [`WindowSystem`].
//! The Windows backend issues Win32 calls; other targets get a backend that
//! reports [`EmbedError::UnsupportedPlatform`](crate::error::EmbedError).

use crate::error::Result;
use std::fmt;

/// Opaque native window handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WindowHandle(pub isize);

impl WindowHandle {
    /// The null handle (the desktop, when used as a parent).
    pub const NULL: WindowHandle = WindowHandle(0);

    /// Wrap a raw handle value.
    pub fn from_raw(raw: isize) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> isize {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A top-level window reported by enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    pub pid: u32,
    pub visible: bool,
}

/// Window rectangle. Coordinates are relative to whatever the producing call
/// documents (screen for [`WindowSystem::window_rect`], host client area for
/// tracked geometry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A rectangle at the origin filling `size`.
    pub fn fill(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }
}

/// Client-area size of a host surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// Window style bits (`GWL_STYLE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WindowStyle(pub u32);

impl WindowStyle {
    pub const CAPTION: u32 = 0x00C0_0000;
    pub const THICKFRAME: u32 = 0x0004_0000;
    pub const SYSMENU: u32 = 0x0008_0000;
    pub const MINIMIZEBOX: u32 = 0x0002_0000;
    pub const MAXIMIZEBOX: u32 = 0x0001_0000;
    pub const VISIBLE: u32 = 0x1000_0000;

    /// All decoration bits removed when embedding.
    pub const DECORATIONS: u32 =
        Self::CAPTION | Self::THICKFRAME | Self::SYSMENU | Self::MINIMIZEBOX | Self::MAXIMIZEBOX;

    pub fn bits(self) -> u32 {
        self.0
    }

    /// This style with every decoration bit cleared.
    pub fn stripped(self) -> Self {
        Self(self.0 & !Self::DECORATIONS)
    }

    pub fn has_decorations(self) -> bool {
        self.0 & Self::DECORATIONS != 0
    }
}

/// Platform windowing operations.
///
/// All methods are synchronous and cheap; callers in async code invoke them
/// directly between awaits.
pub trait WindowSystem: Send + Sync {
    /// Every top-level window on the desktop, in enumeration order.
    fn top_level_windows(&self) -> Result<Vec<WindowInfo>>;

    /// The window the OS considers the main window of `pid`, if any.
    fn main_window(&self, pid: u32) -> Option<WindowHandle>;

    /// Process that owns `window`.
    fn window_pid(&self, window: WindowHandle) -> Option<u32>;

    /// Whether `window` still identifies an existing window.
    fn is_window(&self, window: WindowHandle) -> bool;

    fn style(&self, window: WindowHandle) -> Result<WindowStyle>;

    /// Replace the style bits and make the frame change take effect.
    fn set_style(&self, window: WindowHandle, style: WindowStyle) -> Result<()>;

    /// Reparent `child`; `None` returns it to the desktop.
    fn set_parent(&self, child: WindowHandle, parent: Option<WindowHandle>) -> Result<()>;

    fn show(&self, window: WindowHandle, visible: bool) -> Result<()>;

    /// Move and resize without changing z-order or activation.
    fn move_resize(&self, window: WindowHandle, rect: Rect) -> Result<()>;

    /// Window rectangle in screen coordinates.
    fn window_rect(&self, window: WindowHandle) -> Result<Rect>;

    /// Client-area size of `host`.
    fn client_size(&self, host: WindowHandle) -> Result<Size>;

    /// Convert a screen point into `host` client coordinates.
    fn screen_to_client(&self, host: WindowHandle, x: i32, y: i32) -> Result<(i32, i32)>;

    fn set_focus(&self, window: WindowHandle) -> Result<()>;

    /// Post a virtual-key down or up message.
    fn post_key(&self, window: WindowHandle, key: u32, down: bool) -> Result<()>;
}
