//! The aggregate console session and the manager that drives it.

pub mod handle;
pub mod manager;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConsoleError;
use crate::state::StateCell;

pub use handle::{SessionCommand, SessionHandle};
pub use manager::SessionManager;

// ── ConnectionKind ───────────────────────────────────────────────

/// Remote-desktop protocol of a console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    Vnc,
    Rdp,
    /// Text terminal; its display cannot be scaled.
    Ssh,
}

impl ConnectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vnc => "vnc",
            Self::Rdp => "rdp",
            Self::Ssh => "ssh",
        }
    }

    /// Whether the renderer can scale this kind of display.
    pub fn is_scale_aware(self) -> bool {
        !matches!(self, Self::Ssh)
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionKind {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vnc" => Ok(Self::Vnc),
            "rdp" => Ok(Self::Rdp),
            "ssh" => Ok(Self::Ssh),
            _ => Err(ConsoleError::UnknownConnectionKind(s.to_string())),
        }
    }
}

// ── SessionId ────────────────────────────────────────────────────

/// `"<vm-id>-<kind>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(vm_id: &str, kind: ConnectionKind) -> Self {
        Self(format!("{vm_id}-{kind}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── ConsoleTarget ────────────────────────────────────────────────

/// Which console to open and where its tunnel lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleTarget {
    /// Tunnel endpoint, e.g. `wss://console.example/tunnel`.
    pub base_url: String,
    pub token: String,
    pub vm_id: String,
    pub kind: ConnectionKind,
}

impl ConsoleTarget {
    /// `<base>/<vm-id>/<kind>`.
    pub fn url(&self) -> String {
        format!("{}/{}/{}", self.base_url.trim_end_matches('/'), self.vm_id, self.kind)
    }

    pub fn session_id(&self) -> SessionId {
        SessionId::new(&self.vm_id, self.kind)
    }
}

// ── ClientProperties ─────────────────────────────────────────────

/// Display settings read by the renderer.
///
/// Written by the display scaler and by manual zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientProperties {
    /// Track the fit scale on every recompute.
    pub auto_fit: bool,
    pub scale: f64,
    pub min_scale: f64,
    pub max_scale: f64,
    pub keyboard_enabled: bool,
    pub scroll_left: f64,
    pub scroll_top: f64,
}

impl Default for ClientProperties {
    fn default() -> Self {
        Self {
            auto_fit: true,
            scale: 1.0,
            min_scale: 1.0,
            max_scale: 3.0,
            keyboard_enabled: true,
            scroll_left: 0.0,
            scroll_top: 0.0,
        }
    }
}

impl ClientProperties {
    /// Manual zoom: clamp to the current bounds and stop auto-fitting.
    pub fn set_scale(&mut self, scale: f64) {
        let upper = self.max_scale.max(self.min_scale);
        self.auto_fit = false;
        self.scale = scale.clamp(self.min_scale, upper);
    }

    /// Return to fit-to-viewport; applied on the next recompute.
    pub fn enable_auto_fit(&mut self) {
        self.auto_fit = true;
    }
}

// ── Session ──────────────────────────────────────────────────────

/// One console session as the presentation layer sees it.
///
/// The credential stays on [`ConsoleTarget`] and the latest thumbnail in
/// the [`ThumbnailSampler`](crate::ThumbnailSampler) slot; the manager
/// owns all three.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub kind: ConnectionKind,
    pub state: StateCell,
    pub properties: ClientProperties,
}

impl Session {
    pub fn new(id: SessionId, kind: ConnectionKind) -> Self {
        Self {
            id,
            kind,
            state: StateCell::new(),
            properties: ClientProperties::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_strings() {
        for kind in [ConnectionKind::Vnc, ConnectionKind::Rdp, ConnectionKind::Ssh] {
            assert_eq!(kind.to_string().parse::<ConnectionKind>().unwrap(), kind);
        }
        assert_eq!("RDP".parse::<ConnectionKind>().unwrap(), ConnectionKind::Rdp);
        assert!(matches!(
            "spice".parse::<ConnectionKind>(),
            Err(ConsoleError::UnknownConnectionKind(k)) if k == "spice"
        ));
    }

    #[test]
    fn only_terminals_are_not_scale_aware() {
        assert!(ConnectionKind::Vnc.is_scale_aware());
        assert!(ConnectionKind::Rdp.is_scale_aware());
        assert!(!ConnectionKind::Ssh.is_scale_aware());
    }

    #[test]
    fn target_url_and_id() {
        let target = ConsoleTarget {
            base_url: "wss://console.example/tunnel/".into(),
            token: "secret".into(),
            vm_id: "vm-42".into(),
            kind: ConnectionKind::Vnc,
        };
        assert_eq!(target.url(), "wss://console.example/tunnel/vm-42/vnc");
        assert_eq!(target.session_id().as_str(), "vm-42-vnc");
    }

    #[test]
    fn manual_scale_is_clamped() {
        let mut props = ClientProperties {
            min_scale: 0.5,
            max_scale: 2.0,
            ..Default::default()
        };
        props.set_scale(4.0);
        assert_eq!(props.scale, 2.0);
        assert!(!props.auto_fit);
        props.set_scale(0.1);
        assert_eq!(props.scale, 0.5);
        props.enable_auto_fit();
        assert!(props.auto_fit);
    }
}
