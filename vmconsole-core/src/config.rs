//! Tunable parameters of a console session.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Session timing and sizing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Interval of the display resize/scale poll while connected.
    pub resize_poll_ms: u64,
    /// Base delay before an unanswered resize request is repeated. Doubles
    /// with every attempt.
    pub resize_retry_ms: u64,
    /// Minimum time between two thumbnail captures.
    pub thumbnail_interval_ms: u64,
    /// Thumbnail bounding box.
    pub thumbnail_max_width: u32,
    pub thumbnail_max_height: u32,
    /// Chunk size for binary clipboard uploads.
    pub clipboard_chunk_size: usize,
    /// Upper bound for manual zoom.
    pub max_zoom: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            resize_poll_ms: 50,
            resize_retry_ms: 250,
            thumbnail_interval_ms: 5000,
            thumbnail_max_width: 320,
            thumbnail_max_height: 240,
            clipboard_chunk_size: 6048,
            max_zoom: 3.0,
        }
    }
}

impl SessionConfig {
    pub fn resize_poll_interval(&self) -> Duration {
        Duration::from_millis(self.resize_poll_ms.max(1))
    }

    pub fn resize_retry_interval(&self) -> Duration {
        Duration::from_millis(self.resize_retry_ms)
    }

    pub fn thumbnail_interval(&self) -> Duration {
        Duration::from_millis(self.thumbnail_interval_ms)
    }
}
