//! Boundary to the host environment the console is embedded in.
//!
//! The host owns the clipboard, the window, and the container element
//! the remote display is drawn into. A session reads its geometry
//! through [`HostEnvironment::metrics`] and listens for focus, copy,
//! cut and resize notifications on a broadcast subscription that lives
//! exactly as long as the connection.

pub mod headless;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::clipboard::ClipboardData;
use crate::error::ClipboardError;

pub use headless::HeadlessHost;

/// The container element hosting the remote display, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    /// Height of the toolbar drawn above the display.
    pub header_height: f64,
}

impl Viewport {
    /// Height left for the display once the header is subtracted.
    pub fn content_height(&self) -> f64 {
        (self.height - self.header_height).max(0.0)
    }
}

/// Size of the whole screen, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenSize {
    pub width: f64,
    pub height: f64,
}

/// Geometry snapshot read on every display recompute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostMetrics {
    pub viewport: Viewport,
    pub screen: ScreenSize,
    pub device_pixel_ratio: f64,
    pub fullscreen: bool,
}

/// Where a focus event landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusTarget {
    /// The host window itself.
    Window,
    /// Some element inside the window.
    Descendant,
}

/// Notifications from the host environment.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Focus(FocusTarget),
    Copy,
    Cut,
    Resize,
    FullscreenChanged(bool),
}

/// Asynchronous access to the host clipboard.
#[async_trait]
pub trait HostClipboard: Send + Sync {
    async fn read(&self) -> Result<ClipboardData, ClipboardError>;

    async fn write_text(&self, text: &str) -> Result<(), ClipboardError>;
}

/// Everything a session needs from its host.
pub trait HostEnvironment: Send + Sync {
    fn metrics(&self) -> HostMetrics;

    fn set_fullscreen(&self, fullscreen: bool);

    /// Register a listener for host notifications. Dropping the
    /// receiver deregisters it.
    fn subscribe(&self) -> broadcast::Receiver<HostEvent>;

    fn clipboard(&self) -> Arc<dyn HostClipboard>;
}
