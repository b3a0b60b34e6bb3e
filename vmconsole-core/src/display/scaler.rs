//! Display scaling.
//!
//! Two independent computations run on every poll tick and on explicit
//! geometry changes:
//!
//! - **remote size**: the framebuffer size the remote should render at,
//!   i.e. the visible container (or the whole screen in fullscreen) in
//!   device pixels. Sent only when it differs from what the remote has.
//!   A request the remote has not honoured yet is repeated with a
//!   doubling delay rather than on every tick.
//! - **scale**: the factor that fits the framebuffer into the container
//!   without exceeding native resolution. Skipped for connection kinds
//!   that cannot be scaled, and never applied when it comes out as zero.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::ConsoleError;
use crate::host::HostMetrics;
use crate::session::{ClientProperties, ConnectionKind};
use crate::transport::RemoteTransport;

/// Default delay before an unanswered resize request is repeated.
const DEFAULT_RESIZE_RETRY: Duration = Duration::from_millis(250);

/// Upper bound on the retry delay, as a power of two of the base delay.
const MAX_RETRY_SHIFT: u32 = 5;

/// A resize request the remote has not applied yet.
#[derive(Debug, Clone, Copy)]
struct PendingResize {
    size: (u32, u32),
    sent_at: Instant,
    attempts: u32,
}

/// Keeps the remote framebuffer size and the applied scale in sync with
/// the host viewport.
#[derive(Debug, Clone)]
pub struct DisplayScaler {
    scale_aware: bool,
    max_zoom: f64,
    resize_retry: Duration,
    pending: Option<PendingResize>,
}

impl DisplayScaler {
    pub fn new(kind: ConnectionKind, max_zoom: f64) -> Self {
        Self {
            scale_aware: kind.is_scale_aware(),
            max_zoom,
            resize_retry: DEFAULT_RESIZE_RETRY,
            pending: None,
        }
    }

    pub fn with_resize_retry(mut self, retry: Duration) -> Self {
        self.resize_retry = retry;
        self
    }

    /// Forget any outstanding resize request. Called on every (re)connect.
    pub fn reset(&mut self) {
        self.pending = None;
    }

    #[cfg(test)]
    fn pending_resize(&self) -> Option<(u32, u32)> {
        self.pending.map(|p| p.size)
    }

    fn retry_delay(&self, attempts: u32) -> Duration {
        self.resize_retry * (1u32 << attempts.saturating_sub(1).min(MAX_RETRY_SHIFT))
    }

    // ── Pure geometry ────────────────────────────────────────────

    /// Largest factor that fits `remote` into `container`, capped at 1.
    ///
    /// Zero remote dimensions count as 1. A zero-sized container yields
    /// 0, which callers treat as "do not apply".
    pub fn fit_scale(container_width: f64, container_height: f64, remote_width: u32, remote_height: u32) -> f64 {
        let orig_w = f64::from(remote_width.max(1));
        let orig_h = f64::from(remote_height.max(1));
        let x_scale = container_width.max(0.0) / orig_w;
        let y_scale = container_height.max(0.0) / orig_h;
        x_scale.min(y_scale).min(1.0)
    }

    /// The area the display is drawn into, in CSS pixels: the whole
    /// screen when fullscreen, otherwise the container minus its header.
    pub fn container_size(metrics: &HostMetrics) -> (f64, f64) {
        if metrics.fullscreen {
            (metrics.screen.width, metrics.screen.height)
        } else {
            (metrics.viewport.width, metrics.viewport.content_height())
        }
    }

    /// Framebuffer size to request from the remote, in device pixels.
    pub fn target_remote_size(metrics: &HostMetrics) -> (u32, u32) {
        let (width, height) = Self::container_size(metrics);
        let dpr = if metrics.device_pixel_ratio > 0.0 {
            metrics.device_pixel_ratio
        } else {
            1.0
        };
        (
            (width * dpr).floor().max(0.0) as u32,
            (height * dpr).floor().max(0.0) as u32,
        )
    }

    /// Rendering DPI for the initial connect request.
    pub fn dpi(metrics: &HostMetrics) -> u32 {
        (96.0 * metrics.device_pixel_ratio.max(1.0)).round() as u32
    }

    // ── Application ──────────────────────────────────────────────

    /// Request a remote resize if the remote's size differs from the
    /// target.
    ///
    /// The same size is asked for again only once its retry delay has
    /// elapsed; the delay doubles with every unanswered attempt. Returns
    /// whether a request was sent.
    pub fn recompute_remote_size(
        &mut self,
        transport: &mut dyn RemoteTransport,
        metrics: &HostMetrics,
        now: Instant,
    ) -> Result<bool, ConsoleError> {
        let target = Self::target_remote_size(metrics);
        if target.0 == 0 || target.1 == 0 {
            return Ok(false);
        }

        let display = transport.display();
        if (display.width, display.height) == target {
            self.pending = None;
            return Ok(false);
        }

        let attempts = match self.pending {
            Some(p) if p.size == target => {
                if now.saturating_duration_since(p.sent_at) < self.retry_delay(p.attempts) {
                    return Ok(false);
                }
                p.attempts + 1
            }
            _ => 1,
        };

        let (width, height) = target;
        debug!("requesting remote size {width}x{height} (attempt {attempts})");
        transport.send_remote_size(width, height)?;
        self.pending = Some(PendingResize {
            size: target,
            sent_at: now,
            attempts,
        });
        Ok(true)
    }

    /// Recompute the fit scale and the zoom bounds.
    ///
    /// With auto-fit on, the fit scale is applied; otherwise the manual
    /// scale is kept within the new bounds. Returns the scale now in
    /// effect, or `None` when nothing was computed.
    pub fn recompute_scale(
        &self,
        transport: &mut dyn RemoteTransport,
        metrics: &HostMetrics,
        props: &mut ClientProperties,
    ) -> Option<f64> {
        if !self.scale_aware {
            return None;
        }

        let display = transport.display();
        let (width, height) = Self::container_size(metrics);
        let fit = Self::fit_scale(width, height, display.width, display.height);
        if fit == 0.0 {
            return None;
        }

        props.min_scale = fit;
        props.max_scale = fit.max(self.max_zoom);
        props.scale = if props.auto_fit {
            fit
        } else {
            props.scale.clamp(props.min_scale, props.max_scale)
        };

        if display.scale != props.scale {
            transport.set_display_scale(props.scale);
        }
        Some(props.scale)
    }

    /// Apply a manual zoom level chosen by the user.
    pub fn apply_manual_scale(
        &self,
        transport: &mut dyn RemoteTransport,
        props: &mut ClientProperties,
        scale: f64,
    ) -> Option<f64> {
        if !self.scale_aware {
            return None;
        }
        props.set_scale(scale);
        transport.set_display_scale(props.scale);
        Some(props.scale)
    }
}

// ── Tests ────────────────────────────────────────────────────────
