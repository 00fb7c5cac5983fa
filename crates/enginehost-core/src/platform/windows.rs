//! Win32 backend for [`WindowSystem`].
//!
//! Handles cross the FFI boundary as `HWND` (a raw pointer) and are stored
//! as `isize` in [`WindowHandle`] so they can move between threads.

#![allow(unsafe_code)]

use tracing::debug;
use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, SetLastError, BOOL, HWND, LPARAM, POINT, RECT,
};
use windows_sys::Win32::Graphics::Gdi::ScreenToClient;
use windows_sys::Win32::System::Threading::{
    GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows_sys::Win32::UI::Input::KeyboardAndMouse::SetFocus;
use windows_sys::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetClientRect, GetWindow, GetWindowLongW, GetWindowRect,
    GetWindowThreadProcessId, IsWindow, IsWindowVisible, PostMessageW, SetParent,
    SetWindowLongW, SetWindowPos, ShowWindow, GWL_EXSTYLE, GWL_STYLE, GW_OWNER, SWP_FRAMECHANGED,
    SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE, SWP_NOZORDER, SW_HIDE, SW_SHOW, WM_CLOSE, WM_KEYDOWN,
    WM_KEYUP, WS_EX_TOOLWINDOW,
};

use super::window::{Rect, Size, WindowHandle, WindowInfo, WindowStyle, WindowSystem};
use crate::error::{EmbedError, Result};

const STILL_ACTIVE: u32 = 259;

fn hwnd(handle: WindowHandle) -> HWND {
    handle.raw() as HWND
}

fn handle(hwnd: HWND) -> WindowHandle {
    WindowHandle(hwnd as isize)
}

fn last_error(op: &'static str) -> EmbedError {
    // SAFETY: GetLastError has no preconditions.
    let code = unsafe { GetLastError() };
    EmbedError::window_op(op, format!("win32 error {}", code))
}

fn check(op: &'static str, ok: BOOL) -> Result<()> {
    if ok == 0 {
        Err(last_error(op))
    } else {
        Ok(())
    }
}

struct Enumeration {
    windows: Vec<(HWND, u32)>,
}

unsafe extern "system" fn collect_window(window: HWND, lparam: LPARAM) -> BOOL {
    // SAFETY: lparam is the address of the `Enumeration` owned by
    // `enumerate_windows`, which outlives the EnumWindows call.
    let state = unsafe { &mut *(lparam as *mut Enumeration) };
    let mut pid = 0u32;
    // SAFETY: `window` comes from EnumWindows and `pid` is a valid out pointer.
    unsafe { GetWindowThreadProcessId(window, &mut pid) };
    state.windows.push((window, pid));
    1
}

fn enumerate_windows() -> Result<Vec<(HWND, u32)>> {
    let mut state = Enumeration {
        windows: Vec::new(),
    };
    // SAFETY: the callback only dereferences lparam as the `Enumeration`
    // above, which stays borrowed for the duration of the call.
    let ok = unsafe {
        EnumWindows(
            Some(collect_window),
            &mut state as *mut Enumeration as LPARAM,
        )
    };
    check("EnumWindows", ok)?;
    Ok(state.windows)
}

fn is_visible(window: HWND) -> bool {
    // SAFETY: IsWindowVisible tolerates stale handles.
    unsafe { IsWindowVisible(window) != 0 }
}

/// Main-window heuristic: unowned and not a tool window.
fn is_main_candidate(window: HWND) -> bool {
    // SAFETY: both calls tolerate stale handles and return 0 for them.
    let owner = unsafe { GetWindow(window, GW_OWNER) };
    let ex_style = unsafe { GetWindowLongW(window, GWL_EXSTYLE) } as u32;
    owner.is_null() && ex_style & WS_EX_TOOLWINDOW == 0
}

/// Native Win32 window system.
#[derive(Debug, Default)]
pub struct Win32WindowSystem;

impl Win32WindowSystem {
    pub fn new() -> Self {
        Self
    }
}

impl WindowSystem for Win32WindowSystem {
    fn top_level_windows(&self) -> Result<Vec<WindowInfo>> {
        Ok(enumerate_windows()?
            .into_iter()
            .map(|(window, owner)| WindowInfo {
                handle: handle(window),
                pid: owner,
                visible: is_visible(window),
            })
            .collect())
    }

    fn main_window(&self, pid: u32) -> Option<WindowHandle> {
        let windows = enumerate_windows().ok()?;
        windows
            .iter()
            .filter(|(_, owner)| *owner == pid)
            .find(|(window, _)| is_main_candidate(*window) && is_visible(*window))
            .or_else(|| {
                windows
                    .iter()
                    .filter(|(_, owner)| *owner == pid)
                    .find(|(window, _)| is_main_candidate(*window))
            })
            .map(|(window, _)| handle(*window))
    }

    fn window_pid(&self, window: WindowHandle) -> Option<u32> {
        let mut pid = 0u32;
        // SAFETY: `pid` is a valid out pointer; stale handles yield 0.
        let thread = unsafe { GetWindowThreadProcessId(hwnd(window), &mut pid) };
        (thread != 0).then_some(pid)
    }

    fn is_window(&self, window: WindowHandle) -> bool {
        if window.is_null() {
            return false;
        }
        // SAFETY: IsWindow accepts any value.
        unsafe { IsWindow(hwnd(window)) != 0 }
    }

    fn style(&self, window: WindowHandle) -> Result<WindowStyle> {
        // SAFETY: reading the style of a stale handle returns 0 and sets the
        // last error, which is checked below.
        unsafe { SetLastError(0) };
        let bits = unsafe { GetWindowLongW(hwnd(window), GWL_STYLE) };
        if bits == 0 && unsafe { GetLastError() } != 0 {
            return Err(last_error("GetWindowLong"));
        }
        Ok(WindowStyle(bits as u32))
    }

    fn set_style(&self, window: WindowHandle, style: WindowStyle) -> Result<()> {
        // SAFETY: SetWindowLongW returns 0 both on failure and when the
        // previous value was 0, so the last error disambiguates.
        unsafe { SetLastError(0) };
        let previous = unsafe { SetWindowLongW(hwnd(window), GWL_STYLE, style.bits() as i32) };
        if previous == 0 && unsafe { GetLastError() } != 0 {
            return Err(last_error("SetWindowLong"));
        }
        // SAFETY: frame refresh on the same handle, no pointers involved.
        let ok = unsafe {
            SetWindowPos(
                hwnd(window),
                std::ptr::null_mut(),
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_NOZORDER | SWP_FRAMECHANGED,
            )
        };
        check("SetWindowPos", ok)
    }

    fn set_parent(&self, child: WindowHandle, parent: Option<WindowHandle>) -> Result<()> {
        let new_parent: HWND = parent.map(hwnd).unwrap_or(std::ptr::null_mut());
        // SAFETY: SetParent returns null both on failure and when the
        // previous parent was the desktop; the last error disambiguates.
        unsafe { SetLastError(0) };
        let previous = unsafe { SetParent(hwnd(child), new_parent) };
        if previous.is_null() && unsafe { GetLastError() } != 0 {
            return Err(last_error("SetParent"));
        }
        debug!(
            "Reparented {} under {}",
            child,
            parent.unwrap_or(WindowHandle::NULL)
        );
        Ok(())
    }

    fn show(&self, window: WindowHandle, visible: bool) -> Result<()> {
        let cmd = if visible { SW_SHOW } else { SW_HIDE };
        // SAFETY: the return value is the previous visibility, not an error.
        unsafe { ShowWindow(hwnd(window), cmd) };
        if self.is_window(window) {
            Ok(())
        } else {
            Err(EmbedError::window_op("ShowWindow", "window no longer exists"))
        }
    }

    fn move_resize(&self, window: WindowHandle, rect: Rect) -> Result<()> {
        // SAFETY: plain value arguments on a window handle.
        let ok = unsafe {
            SetWindowPos(
                hwnd(window),
                std::ptr::null_mut(),
                rect.x,
                rect.y,
                rect.width,
                rect.height,
                SWP_NOZORDER | SWP_NOACTIVATE,
            )
        };
        check("SetWindowPos", ok)
    }

    fn window_rect(&self, window: WindowHandle) -> Result<Rect> {
        let mut rect = RECT {
            left: 0,
            top: 0,
            right: 0,
            bottom: 0,
        };
        // SAFETY: `rect` is a valid out pointer.
        let ok = unsafe { GetWindowRect(hwnd(window), &mut rect) };
        check("GetWindowRect", ok)?;
        Ok(Rect::new(
            rect.left,
            rect.top,
            rect.right - rect.left,
            rect.bottom - rect.top,
        ))
    }

    fn client_size(&self, host: WindowHandle) -> Result<Size> {
        let mut rect = RECT {
            left: 0,
            top: 0,
            right: 0,
            bottom: 0,
        };
        // SAFETY: `rect` is a valid out pointer.
        let ok = unsafe { GetClientRect(hwnd(host), &mut rect) };
        check("GetClientRect", ok)?;
        Ok(Size::new(rect.right - rect.left, rect.bottom - rect.top))
    }

    fn screen_to_client(&self, host: WindowHandle, x: i32, y: i32) -> Result<(i32, i32)> {
        let mut point = POINT { x, y };
        // SAFETY: `point` is a valid in/out pointer.
        let ok = unsafe { ScreenToClient(hwnd(host), &mut point) };
        check("ScreenToClient", ok)?;
        Ok((point.x, point.y))
    }

    fn set_focus(&self, window: WindowHandle) -> Result<()> {
        // SAFETY: SetFocus returns null on failure, including for windows
        // attached to another thread's input queue.
        unsafe { SetLastError(0) };
        let previous = unsafe { SetFocus(hwnd(window)) };
        if previous.is_null() && unsafe { GetLastError() } != 0 {
            return Err(last_error("SetFocus"));
        }
        Ok(())
    }

    fn post_key(&self, window: WindowHandle, key: u32, down: bool) -> Result<()> {
        let msg = if down { WM_KEYDOWN } else { WM_KEYUP };
        // SAFETY: key messages carry no pointers.
        let ok = unsafe { PostMessageW(hwnd(window), msg, key as usize, 0) };
        check("PostMessage", ok)
    }
}

/// Check liveness through the process exit code.
pub(crate) fn is_process_alive(pid: u32) -> bool {
    // SAFETY: the handle is closed before returning and `code` is a valid
    // out pointer.
    unsafe {
        let process = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if process.is_null() {
            return false;
        }
        let mut code = 0u32;
        let ok = GetExitCodeProcess(process, &mut code);
        CloseHandle(process);
        ok != 0 && code == STILL_ACTIVE
    }
}

/// Post `WM_CLOSE` to every top-level window of `pid`; returns how many
/// windows accepted the message.
pub(crate) fn post_close_to_process(pid: u32) -> usize {
    let Ok(windows) = enumerate_windows() else {
        return 0;
    };
    windows
        .into_iter()
        .filter(|(_, owner)| *owner == pid)
        // SAFETY: WM_CLOSE carries no pointers.
        .filter(|(window, _)| unsafe { PostMessageW(*window, WM_CLOSE, 0, 0) } != 0)
        .count()
}
