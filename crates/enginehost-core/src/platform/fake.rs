//! Scripted in-memory window system for tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::window::{Rect, Size, WindowHandle, WindowInfo, WindowStyle, WindowSystem};
use crate::error::{EmbedError, Result};

/// Screen position of every fake host's client origin.
pub(crate) const HOST_ORIGIN: (i32, i32) = (100, 50);

const DECORATED: WindowStyle = WindowStyle(WindowStyle::VISIBLE | WindowStyle::DECORATIONS);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    SetStyle(WindowHandle, WindowStyle),
    SetParent(WindowHandle, Option<WindowHandle>),
    Show(WindowHandle, bool),
    MoveResize(WindowHandle, Rect),
    SetFocus(WindowHandle),
    PostKey(WindowHandle, u32, bool),
}

#[derive(Debug, Clone)]
struct FakeWindow {
    pid: u32,
    visible: bool,
    style: WindowStyle,
    parent: Option<WindowHandle>,
    /// Client-relative when parented, screen otherwise.
    rect: Rect,
    appears_on_poll: u32,
}

#[derive(Debug, Default)]
struct Inner {
    windows: BTreeMap<isize, FakeWindow>,
    hosts: HashMap<isize, Size>,
    main_windows: HashMap<u32, WindowHandle>,
    polls: u32,
    calls: Vec<Call>,
    fail_reparent: bool,
}

#[derive(Debug, Default)]
pub(crate) struct FakeWindowSystem {
    inner: Mutex<Inner>,
}

impl FakeWindowSystem {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_host(&self, host: WindowHandle, size: Size) {
        self.inner.lock().unwrap().hosts.insert(host.raw(), size);
    }

    pub(crate) fn set_host_size(&self, host: WindowHandle, size: Size) {
        self.add_host(host, size);
    }

    /// A top-level window owned by `pid` that is visible to enumeration
    /// starting with poll number `poll` (1-based).
    pub(crate) fn add_window_on_poll(&self, pid: u32, window: WindowHandle, visible: bool, poll: u32) {
        self.inner.lock().unwrap().windows.insert(
            window.raw(),
            FakeWindow {
                pid,
                visible,
                style: DECORATED,
                parent: None,
                rect: Rect::new(300, 300, 640, 480),
                appears_on_poll: poll,
            },
        );
    }

    pub(crate) fn add_window(&self, pid: u32, window: WindowHandle, visible: bool) {
        self.add_window_on_poll(pid, window, visible, 1);
    }

    pub(crate) fn set_main_window(&self, pid: u32, window: WindowHandle) {
        self.inner.lock().unwrap().main_windows.insert(pid, window);
    }

    pub(crate) fn destroy_window(&self, window: WindowHandle) {
        self.inner.lock().unwrap().windows.remove(&window.raw());
    }

    /// Move a window behind the embedder's back.
    pub(crate) fn nudge_window(&self, window: WindowHandle, rect: Rect) {
        if let Some(w) = self.inner.lock().unwrap().windows.get_mut(&window.raw()) {
            w.rect = rect;
        }
    }

    pub(crate) fn fail_reparent(&self, fail: bool) {
        self.inner.lock().unwrap().fail_reparent = fail;
    }

    pub(crate) fn polls(&self) -> u32 {
        self.inner.lock().unwrap().polls
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub(crate) fn parent_of(&self, window: WindowHandle) -> Option<WindowHandle> {
        self.inner
            .lock()
            .unwrap()
            .windows
            .get(&window.raw())
            .and_then(|w| w.parent)
    }

    /// Client-relative rectangle of a parented window.
    pub(crate) fn rect_of(&self, window: WindowHandle) -> Option<Rect> {
        self.inner
            .lock()
            .unwrap()
            .windows
            .get(&window.raw())
            .map(|w| w.rect)
    }

    pub(crate) fn style_of(&self, window: WindowHandle) -> Option<WindowStyle> {
        self.inner
            .lock()
            .unwrap()
            .windows
            .get(&window.raw())
            .map(|w| w.style)
    }

    fn with_window<T>(
        &self,
        op: &'static str,
        window: WindowHandle,
        f: impl FnOnce(&mut FakeWindow) -> T,
    ) -> Result<T> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .windows
            .get_mut(&window.raw())
            .map(f)
            .ok_or_else(|| EmbedError::window_op(op, "invalid window handle"))
    }

    fn record(&self, call: Call) {
        self.inner.lock().unwrap().calls.push(call);
    }
}

impl WindowSystem for FakeWindowSystem {
    fn top_level_windows(&self) -> Result<Vec<WindowInfo>> {
        let mut inner = self.inner.lock().unwrap();
        inner.polls += 1;
        let poll = inner.polls;
        Ok(inner
            .windows
            .iter()
            .filter(|(_, w)| w.parent.is_none() && w.appears_on_poll <= poll)
            .map(|(raw, w)| WindowInfo {
                handle: WindowHandle(*raw),
                pid: w.pid,
                visible: w.visible,
            })
            .collect())
    }

    fn main_window(&self, pid: u32) -> Option<WindowHandle> {
        self.inner.lock().unwrap().main_windows.get(&pid).copied()
    }

    fn window_pid(&self, window: WindowHandle) -> Option<u32> {
        self.inner
            .lock()
            .unwrap()
            .windows
            .get(&window.raw())
            .map(|w| w.pid)
    }

    fn is_window(&self, window: WindowHandle) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.windows.contains_key(&window.raw()) || inner.hosts.contains_key(&window.raw())
    }

    fn style(&self, window: WindowHandle) -> Result<WindowStyle> {
        self.with_window("GetWindowLong", window, |w| w.style)
    }

    fn set_style(&self, window: WindowHandle, style: WindowStyle) -> Result<()> {
        self.record(Call::SetStyle(window, style));
        self.with_window("SetWindowLong", window, |w| w.style = style)
    }

    fn set_parent(&self, child: WindowHandle, parent: Option<WindowHandle>) -> Result<()> {
        self.record(Call::SetParent(child, parent));
        if self.inner.lock().unwrap().fail_reparent {
            return Err(EmbedError::window_op("SetParent", "access denied"));
        }
        self.with_window("SetParent", child, |w| w.parent = parent)
    }

    fn show(&self, window: WindowHandle, visible: bool) -> Result<()> {
        self.record(Call::Show(window, visible));
        self.with_window("ShowWindow", window, |w| w.visible = visible)
    }

    fn move_resize(&self, window: WindowHandle, rect: Rect) -> Result<()> {
        self.record(Call::MoveResize(window, rect));
        self.with_window("SetWindowPos", window, |w| w.rect = rect)
    }

    fn window_rect(&self, window: WindowHandle) -> Result<Rect> {
        let (parent, rect) = self.with_window("GetWindowRect", window, |w| (w.parent, w.rect))?;
        Ok(match parent {
            Some(_) => Rect::new(
                rect.x + HOST_ORIGIN.0,
                rect.y + HOST_ORIGIN.1,
                rect.width,
                rect.height,
            ),
            None => rect,
        })
    }

    fn client_size(&self, host: WindowHandle) -> Result<Size> {
        self.inner
            .lock()
            .unwrap()
            .hosts
            .get(&host.raw())
            .copied()
            .ok_or_else(|| EmbedError::window_op("GetClientRect", "invalid host handle"))
    }

    fn screen_to_client(&self, host: WindowHandle, x: i32, y: i32) -> Result<(i32, i32)> {
        if !self.inner.lock().unwrap().hosts.contains_key(&host.raw()) {
            return Err(EmbedError::window_op("ScreenToClient", "invalid host handle"));
        }
        Ok((x - HOST_ORIGIN.0, y - HOST_ORIGIN.1))
    }

    fn set_focus(&self, window: WindowHandle) -> Result<()> {
        self.record(Call::SetFocus(window));
        self.with_window("SetFocus", window, |_| ())
    }

    fn post_key(&self, window: WindowHandle, key: u32, down: bool) -> Result<()> {
        self.record(Call::PostKey(window, key, down));
        self.with_window("PostMessage", window, |_| ())
    }
}
