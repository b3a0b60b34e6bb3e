//! Connection state of a console session.
//!
//! A [`ConnectionState`] is a small `Copy` value: the current
//! [`ConnectionPhase`], the status code reported with the last error,
//! and a side flag for a degraded tunnel. Error phases are sticky:
//! once entered, only an explicit reset (reconnect) leaves them.

use std::fmt;

// ── ConnectionPhase ──────────────────────────────────────────────

/// The current phase of a console connection.
///
/// ```text
///  Idle ──► Connecting ──► Waiting ──► Connected ──► Disconnecting ──► Disconnected
///              │              │            │               │
///              └──────────────┴─────┬──────┴───────────────┘
///                                   ▼
///                      ClientError | TunnelError   (sticky)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionPhase {
    /// No connection attempted yet.
    #[default]
    Idle,
    /// Tunnel is being opened.
    Connecting,
    /// Handshake acknowledged; waiting for the first frame.
    Waiting,
    /// First frame received; the session is interactive.
    Connected,
    /// Close requested by the user or the remote.
    Disconnecting,
    /// Connection closed cleanly.
    Disconnected,
    /// The remote session reported a protocol fault.
    ClientError,
    /// The underlying tunnel failed.
    TunnelError,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Waiting => write!(f, "Waiting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::ClientError => write!(f, "ClientError"),
            Self::TunnelError => write!(f, "TunnelError"),
        }
    }
}

impl ConnectionPhase {
    /// Returns `true` when the session is interactive.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` for the sticky error phases.
    pub fn is_error(self) -> bool {
        matches!(self, Self::ClientError | Self::TunnelError)
    }

    /// Human-readable label for the presentation layer.
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting...",
            Self::Waiting => "Waiting for display...",
            Self::Connected => "Connected",
            Self::Disconnecting => "Disconnecting...",
            Self::Disconnected => "Disconnected",
            Self::ClientError => "Remote session error",
            Self::TunnelError => "Connection lost",
        }
    }
}

// ── StatusCode ───────────────────────────────────────────────────

/// Protocol-level status code reported with a client or tunnel error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const SUCCESS: Self = Self(0x0000);
    pub const UNSUPPORTED: Self = Self(0x0100);
    pub const SERVER_ERROR: Self = Self(0x0200);
    pub const SERVER_BUSY: Self = Self(0x0201);
    pub const UPSTREAM_TIMEOUT: Self = Self(0x0202);
    pub const UPSTREAM_ERROR: Self = Self(0x0203);
    pub const RESOURCE_NOT_FOUND: Self = Self(0x0204);
    pub const RESOURCE_CONFLICT: Self = Self(0x0205);
    pub const RESOURCE_CLOSED: Self = Self(0x0206);
    pub const UPSTREAM_NOT_FOUND: Self = Self(0x0207);
    pub const UPSTREAM_UNAVAILABLE: Self = Self(0x0208);
    pub const SESSION_CONFLICT: Self = Self(0x0209);
    pub const SESSION_TIMEOUT: Self = Self(0x020A);
    pub const SESSION_CLOSED: Self = Self(0x020B);
    pub const CLIENT_BAD_REQUEST: Self = Self(0x0300);
    pub const CLIENT_UNAUTHORIZED: Self = Self(0x0301);
    pub const CLIENT_FORBIDDEN: Self = Self(0x0303);
    pub const CLIENT_TIMEOUT: Self = Self(0x0308);
    pub const CLIENT_OVERRUN: Self = Self(0x030D);
    pub const CLIENT_BAD_TYPE: Self = Self(0x030F);
    pub const CLIENT_TOO_MANY: Self = Self(0x031D);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Whether the remote refused the credentials. The presentation
    /// layer redirects away from the console on these.
    pub fn is_unauthorized(self) -> bool {
        matches!(self, Self::CLIENT_UNAUTHORIZED | Self::CLIENT_FORBIDDEN)
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::SUCCESS => "success",
            Self::UNSUPPORTED => "operation unsupported",
            Self::SERVER_ERROR => "internal server error",
            Self::SERVER_BUSY => "server busy",
            Self::UPSTREAM_TIMEOUT => "remote desktop timed out",
            Self::UPSTREAM_ERROR => "remote desktop error",
            Self::RESOURCE_NOT_FOUND => "resource not found",
            Self::RESOURCE_CONFLICT => "resource conflict",
            Self::RESOURCE_CLOSED => "resource closed",
            Self::UPSTREAM_NOT_FOUND => "remote desktop not found",
            Self::UPSTREAM_UNAVAILABLE => "remote desktop unavailable",
            Self::SESSION_CONFLICT => "session conflict",
            Self::SESSION_TIMEOUT => "session timed out",
            Self::SESSION_CLOSED => "session closed",
            Self::CLIENT_BAD_REQUEST => "bad request",
            Self::CLIENT_UNAUTHORIZED => "unauthorized",
            Self::CLIENT_FORBIDDEN => "forbidden",
            Self::CLIENT_TIMEOUT => "client timed out",
            Self::CLIENT_OVERRUN => "client overrun",
            Self::CLIENT_BAD_TYPE => "unsupported data type",
            Self::CLIENT_TOO_MANY => "too many connections",
            _ => "unknown status",
        }
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        Self::SUCCESS
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {:#06x} ({})", self.0, self.description())
    }
}

// ── ConnectionState ──────────────────────────────────────────────

/// Phase, last status code and tunnel stability of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionState {
    phase: ConnectionPhase,
    status_code: StatusCode,
    tunnel_unstable: bool,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Meaningful only in an error phase; `SUCCESS` otherwise.
    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    pub fn is_tunnel_unstable(&self) -> bool {
        self.tunnel_unstable
    }

    /// Move to `phase`, optionally recording a status code.
    ///
    /// No-op once an error phase has been reached. Any accepted
    /// transition clears the tunnel-unstable flag. Returns whether the
    /// value changed.
    pub fn set_connection_state(&mut self, phase: ConnectionPhase, status: Option<StatusCode>) -> bool {
        if self.phase.is_error() {
            return false;
        }
        let before = *self;
        self.phase = phase;
        self.tunnel_unstable = false;
        if let Some(code) = status {
            self.status_code = code;
        }
        before != *self
    }

    /// Flag or clear a degraded tunnel without touching the phase.
    ///
    /// Frozen together with the phase once an error has been reached.
    pub fn set_tunnel_unstable(&mut self, unstable: bool) -> bool {
        if self.phase.is_error() || self.tunnel_unstable == unstable {
            return false;
        }
        self.tunnel_unstable = unstable;
        true
    }

    /// Human-readable label, including the instability warning.
    pub fn label(&self) -> String {
        match (self.phase, self.tunnel_unstable) {
            (phase, _) if phase.is_error() => {
                format!("{}: {}", phase.label(), self.status_code.description())
            }
            (ConnectionPhase::Connected, true) => "Connected (unstable network)".to_string(),
            (phase, _) => phase.label().to_string(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_PHASES: [ConnectionPhase; 8] = [
        ConnectionPhase::Idle,
        ConnectionPhase::Connecting,
        ConnectionPhase::Waiting,
        ConnectionPhase::Connected,
        ConnectionPhase::Disconnecting,
        ConnectionPhase::Disconnected,
        ConnectionPhase::ClientError,
        ConnectionPhase::TunnelError,
    ];

    #[test]
    fn happy_path_lifecycle() {
        let mut state = ConnectionState::new();
        assert_eq!(state.phase(), ConnectionPhase::Idle);

        for phase in [
            ConnectionPhase::Connecting,
            ConnectionPhase::Waiting,
            ConnectionPhase::Connected,
            ConnectionPhase::Disconnecting,
            ConnectionPhase::Disconnected,
        ] {
            assert!(state.set_connection_state(phase, None));
            assert_eq!(state.phase(), phase);
            assert!(state.status_code().is_success());
        }
    }

    #[test]
    fn error_is_sticky() {
        for error in [ConnectionPhase::ClientError, ConnectionPhase::TunnelError] {
            let mut state = ConnectionState::new();
            state.set_connection_state(ConnectionPhase::Connected, None);
            state.set_connection_state(error, Some(StatusCode::UPSTREAM_TIMEOUT));
            let frozen = state;

            for phase in ALL_PHASES {
                assert!(!state.set_connection_state(phase, None));
                assert!(!state.set_connection_state(phase, Some(StatusCode::SUCCESS)));
                assert!(!state.set_connection_state(phase, Some(StatusCode::CLIENT_FORBIDDEN)));
            }
            assert_eq!(state, frozen);
            assert_eq!(state.phase(), error);
            assert_eq!(state.status_code(), StatusCode::UPSTREAM_TIMEOUT);
        }
    }

    #[test]
    fn instability_does_not_reset_error() {
        let mut state = ConnectionState::new();
        state.set_connection_state(ConnectionPhase::TunnelError, Some(StatusCode::UPSTREAM_ERROR));
        assert!(!state.set_tunnel_unstable(true));
        assert!(!state.set_tunnel_unstable(false));
        assert_eq!(state.phase(), ConnectionPhase::TunnelError);
        assert_eq!(state.status_code(), StatusCode::UPSTREAM_ERROR);
    }

    #[test]
    fn instability_is_a_side_flag() {
        let mut state = ConnectionState::new();
        state.set_connection_state(ConnectionPhase::Connected, None);

        assert!(state.set_tunnel_unstable(true));
        assert!(state.is_tunnel_unstable());
        assert_eq!(state.phase(), ConnectionPhase::Connected);

        // Any fresh transition clears instability.
        state.set_connection_state(ConnectionPhase::Disconnecting, None);
        assert!(!state.is_tunnel_unstable());
    }

    #[test]
    fn status_code_only_overwritten_when_supplied() {
        let mut state = ConnectionState::new();
        state.set_connection_state(ConnectionPhase::Connecting, Some(StatusCode::SERVER_BUSY));
        state.set_connection_state(ConnectionPhase::Waiting, None);
        assert_eq!(state.status_code(), StatusCode::SERVER_BUSY);
    }

    #[test]
    fn unauthorized_codes() {
        assert!(StatusCode::CLIENT_UNAUTHORIZED.is_unauthorized());
        assert!(StatusCode::CLIENT_FORBIDDEN.is_unauthorized());
        assert!(!StatusCode::UPSTREAM_ERROR.is_unauthorized());
    }

    #[test]
    fn labels() {
        let mut state = ConnectionState::new();
        state.set_connection_state(ConnectionPhase::Connected, None);
        assert_eq!(state.label(), "Connected");
        state.set_tunnel_unstable(true);
        assert!(state.label().contains("unstable"));

        state.set_connection_state(ConnectionPhase::ClientError, Some(StatusCode::CLIENT_FORBIDDEN));
        assert_eq!(state.label(), "Remote session error: forbidden");
    }

    #[test]
    fn display_format() {
        assert_eq!(ConnectionPhase::Idle.to_string(), "Idle");
        assert_eq!(ConnectionPhase::TunnelError.to_string(), "TunnelError");
        assert_eq!(
            StatusCode::CLIENT_UNAUTHORIZED.to_string(),
            "status 0x0301 (unauthorized)"
        );
    }
}
