//! Console driver configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use vmconsole_core::host::{HostMetrics, ScreenSize, Viewport};
use vmconsole_core::{ConnectionKind, ConsoleTarget, SessionConfig};

/// Top-level configuration for the console driver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Which console to open.
    pub console: ConsoleConfig,
    /// Session timing and sizing.
    pub session: SessionConfig,
    /// Initial host geometry.
    pub viewport: ViewportConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Console endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Tunnel base URL; the VM id and kind are appended.
    pub endpoint: String,
    /// Access token sent with the connect request.
    pub token: String,
    pub vm_id: String,
    /// "vnc", "rdp" or "ssh".
    pub kind: ConnectionKind,
}

/// Host geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Container width in CSS pixels.
    pub width: f64,
    /// Container height in CSS pixels.
    pub height: f64,
    /// Toolbar height above the display.
    pub header_height: f64,
    pub device_pixel_ratio: f64,
    pub screen_width: f64,
    pub screen_height: f64,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level, used when `RUST_LOG` is unset.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://127.0.0.1:8443/console".into(),
            token: String::new(),
            vm_id: "vm-1".into(),
            kind: ConnectionKind::Vnc,
        }
    }
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 800.0,
            header_height: 48.0,
            device_pixel_ratio: 1.0,
            screen_width: 1920.0,
            screen_height: 1080.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

// ── Conversions ──────────────────────────────────────────────────

impl ConsoleConfig {
    pub fn target(&self) -> ConsoleTarget {
        ConsoleTarget {
            base_url: self.endpoint.clone(),
            token: self.token.clone(),
            vm_id: self.vm_id.clone(),
            kind: self.kind,
        }
    }
}

impl ViewportConfig {
    pub fn metrics(&self) -> HostMetrics {
        HostMetrics {
            viewport: Viewport {
                width: self.width,
                height: self.height,
                header_height: self.header_height,
            },
            screen: ScreenSize {
                width: self.screen_width,
                height: self.screen_height,
            },
            device_pixel_ratio: self.device_pixel_ratio,
            fullscreen: false,
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl CliConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write default config to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }
}

// ── Tests ────────────────────────────────────────────────────────
