//! Rate-limited preview snapshots of the live display.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::SessionConfig;
use crate::display::RawFrame;
use crate::state::ConnectionPhase;
use crate::transport::RemoteTransport;

/// A down-sampled copy of the display and when it was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub timestamp: Instant,
    pub snapshot: RawFrame,
}

/// Captures thumbnails no more often than once per interval.
pub struct ThumbnailSampler {
    interval: Duration,
    max_width: u32,
    max_height: u32,
    slot: watch::Sender<Option<Thumbnail>>,
}

impl ThumbnailSampler {
    pub fn new(interval: Duration, max_width: u32, max_height: u32) -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            interval,
            max_width: max_width.max(1),
            max_height: max_height.max(1),
            slot,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.thumbnail_interval(),
            config.thumbnail_max_width,
            config.thumbnail_max_height,
        )
    }

    pub fn latest(&self) -> Option<Thumbnail> {
        self.slot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Thumbnail>> {
        self.slot.subscribe()
    }

    /// Capture if the previous thumbnail is at least one interval old.
    ///
    /// Returns whether a new thumbnail was stored.
    pub fn maybe_sample(&self, phase: ConnectionPhase, transport: &dyn RemoteTransport, now: Instant) -> bool {
        let due = match self.slot.borrow().as_ref() {
            Some(previous) => now.saturating_duration_since(previous.timestamp) >= self.interval,
            None => true,
        };
        due && self.capture(phase, transport, now).is_some()
    }

    /// Capture immediately, ignoring the rate limit.
    ///
    /// Nothing is captured unless the session is connected and the
    /// transport has a framebuffer.
    pub fn capture(&self, phase: ConnectionPhase, transport: &dyn RemoteTransport, now: Instant) -> Option<Thumbnail> {
        if !phase.is_connected() {
            return None;
        }
        let frame = transport.framebuffer()?;
        let thumbnail = Thumbnail {
            timestamp: now,
            snapshot: self.downsample(&frame),
        };
        self.slot.send_replace(Some(thumbnail.clone()));
        Some(thumbnail)
    }

    /// Fit `frame` inside the thumbnail bounds, keeping its aspect ratio.
    /// Frames already small enough are copied as-is.
    fn downsample(&self, frame: &RawFrame) -> RawFrame {
        if frame.width <= self.max_width && frame.height <= self.max_height {
            return frame.clone();
        }
        let (w, h) = (u64::from(frame.width), u64::from(frame.height));
        let (max_w, max_h) = (u64::from(self.max_width), u64::from(self.max_height));
        let (width, height) = if max_w * h <= max_h * w {
            (max_w, h * max_w / w)
        } else {
            (w * max_h / h, max_h)
        };
        frame.resample(width.max(1) as u32, height.max(1) as u32)
    }
}

// ── Tests ────────────────────────────────────────────────────────
