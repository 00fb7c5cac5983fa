//! Reparenting a located window into the host surface.

use crate::cancel::CancellationToken;
use crate::error::{EmbedError, Result};
use crate::platform::{Rect, WindowHandle, WindowStyle, WindowSystem};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A window currently parented to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddedWindow {
    pub handle: WindowHandle,
    pub host: WindowHandle,
    /// Style bits before decorations were stripped.
    pub original_style: WindowStyle,
    /// Last geometry applied, relative to the host client area.
    pub geometry: Rect,
}

/// Embeds at most one window at a time.
///
/// Every geometry change (initial fit, explicit resize, drift correction and
/// detach) goes through the same mutex, so they never interleave.
pub struct WindowEmbedder {
    windows: Arc<dyn WindowSystem>,
    host_ready_attempts: u32,
    host_ready_interval: Duration,
    embedded: Mutex<Option<EmbeddedWindow>>,
}

impl WindowEmbedder {
    pub fn new(
        windows: Arc<dyn WindowSystem>,
        host_ready_attempts: u32,
        host_ready_interval: Duration,
    ) -> Self {
        Self {
            windows,
            host_ready_attempts,
            host_ready_interval,
            embedded: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<EmbeddedWindow>> {
        self.embedded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn embedded(&self) -> Option<EmbeddedWindow> {
        *self.slot()
    }

    pub fn window(&self) -> Option<WindowHandle> {
        self.embedded().map(|e| e.handle)
    }

    pub fn geometry(&self) -> Option<Rect> {
        self.embedded().map(|e| e.geometry)
    }

    /// Wait for `host` to become a valid window.
    async fn wait_for_host(&self, host: WindowHandle, cancel: &CancellationToken) -> Result<()> {
        for attempt in 1..=self.host_ready_attempts.max(1) {
            if self.windows.is_window(host) {
                return Ok(());
            }
            debug!("Host {} not ready (attempt {})", host, attempt);
            if attempt < self.host_ready_attempts {
                tokio::select! {
                    _ = tokio::time::sleep(self.host_ready_interval) => {}
                    _ = cancel.cancelled() => return Err(EmbedError::Cancelled),
                }
            }
        }
        Err(EmbedError::HostNotReady { handle: host.raw() })
    }

    /// Hide, strip decorations, reparent, fit to the host and show.
    pub async fn embed(
        &self,
        window: WindowHandle,
        host: WindowHandle,
        cancel: &CancellationToken,
    ) -> Result<EmbeddedWindow> {
        if let Some(current) = self.embedded() {
            return Err(EmbedError::EmbedFailed {
                message: format!("window {} is already embedded", current.handle),
            });
        }

        self.wait_for_host(host, cancel).await?;
        cancel.check()?;

        let mut slot = self.slot();
        if slot.is_some() {
            return Err(EmbedError::EmbedFailed {
                message: "another window was embedded concurrently".to_string(),
            });
        }

        let original_style = self.windows.style(window)?;
        match self.attach(window, host, original_style) {
            Ok(geometry) => {
                let embedded = EmbeddedWindow {
                    handle: window,
                    host,
                    original_style,
                    geometry,
                };
                *slot = Some(embedded);
                info!("Embedded window {} into host {} at {:?}", window, host, geometry);
                Ok(embedded)
            }
            Err(e) => {
                warn!("Embedding window {} failed: {}", window, e);
                self.rollback(window, original_style);
                Err(match e {
                    EmbedError::WindowOp { op, message } => EmbedError::EmbedFailed {
                        message: format!("{op}: {message}"),
                    },
                    other => other,
                })
            }
        }
    }

    fn attach(
        &self,
        window: WindowHandle,
        host: WindowHandle,
        original_style: WindowStyle,
    ) -> Result<Rect> {
        self.windows.show(window, false)?;
        self.windows.set_style(window, original_style.stripped())?;
        self.windows.set_parent(window, Some(host))?;

        let geometry = Rect::fill(self.windows.client_size(host)?);
        self.windows.move_resize(window, geometry)?;
        self.windows.show(window, true)?;

        // Some windows restore their frame when shown.
        let style = self.windows.style(window)?;
        if style.has_decorations() {
            self.windows.set_style(window, style.stripped())?;
        }
        Ok(geometry)
    }

    fn rollback(&self, window: WindowHandle, original_style: WindowStyle) {
        if !self.windows.is_window(window) {
            return;
        }
        if let Err(e) = self.windows.set_parent(window, None) {
            debug!("Rollback reparent of {} failed: {}", window, e);
        }
        if let Err(e) = self.windows.set_style(window, original_style) {
            debug!("Rollback style of {} failed: {}", window, e);
        }
        let _ = self.windows.show(window, true);
    }

    /// Resize the embedded window to `width` x `height` at the host origin.
    ///
    /// Returns `false` when nothing is embedded or the size is empty.
    pub fn resize(&self, width: i32, height: i32) -> Result<bool> {
        if width <= 0 || height <= 0 {
            debug!("Ignoring empty resize {}x{}", width, height);
            return Ok(false);
        }

        let mut slot = self.slot();
        let Some(embedded) = slot.as_mut() else {
            return Ok(false);
        };

        let geometry = Rect::new(0, 0, width, height);
        self.windows.move_resize(embedded.handle, geometry)?;
        embedded.geometry = geometry;
        debug!("Resized window {} to {}x{}", embedded.handle, width, height);
        Ok(true)
    }

    /// Make the embedded window fill the host again if it drifted.
    ///
    /// Returns `true` when a correction was issued.
    pub fn reconcile(&self) -> Result<bool> {
        let mut slot = self.slot();
        let Some(embedded) = slot.as_mut() else {
            return Ok(false);
        };

        let sync_err = |e: EmbedError| EmbedError::SyncFailed {
            message: e.to_string(),
        };

        if !self.windows.is_window(embedded.handle) {
            return Err(EmbedError::SyncFailed {
                message: format!("window {} no longer exists", embedded.handle),
            });
        }

        let host_size = self.windows.client_size(embedded.host).map_err(sync_err)?;
        if host_size.is_empty() {
            return Ok(false);
        }

        let screen = self.windows.window_rect(embedded.handle).map_err(sync_err)?;
        let (x, y) = self
            .windows
            .screen_to_client(embedded.host, screen.x, screen.y)
            .map_err(sync_err)?;
        let current = Rect::new(x, y, screen.width, screen.height);
        let target = Rect::fill(host_size);

        if current == target {
            embedded.geometry = target;
            return Ok(false);
        }

        debug!(
            "Window {} drifted to {:?}, restoring {:?}",
            embedded.handle, current, target
        );
        self.windows
            .move_resize(embedded.handle, target)
            .map_err(sync_err)?;
        embedded.geometry = target;
        Ok(true)
    }

    /// Return the window to the desktop and restore its original style.
    ///
    /// A no-op (returning `false`) when nothing is embedded. A window that was
    /// destroyed meanwhile is simply forgotten.
    pub fn detach(&self) -> Result<bool> {
        let Some(embedded) = self.slot().take() else {
            return Ok(false);
        };

        if !self.windows.is_window(embedded.handle) {
            debug!("Embedded window {} is already gone", embedded.handle);
            return Ok(true);
        }

        self.windows.set_parent(embedded.handle, None)?;
        if let Err(e) = self
            .windows
            .set_style(embedded.handle, embedded.original_style)
        {
            warn!("Failed to restore style of {}: {}", embedded.handle, e);
        }
        info!("Detached window {} from host {}", embedded.handle, embedded.host);
        Ok(true)
    }
}
