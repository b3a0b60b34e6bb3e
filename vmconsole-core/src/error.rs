//! Domain-specific error types for the console session core.
//!
//! Session operations return `Result<T, ConsoleError>`. Clipboard
//! operations return `Result<T, ClipboardError>`, which is `Clone`
//! because the outcome of one in-flight host read is handed to every
//! caller waiting on it.

use std::time::Duration;
use thiserror::Error;

use crate::state::StatusCode;

/// The canonical error type for a console session.
#[derive(Debug, Error)]
pub enum ConsoleError {
    // ── Transport Errors ─────────────────────────────────────────
    /// The transport collaborator failed to carry out a request.
    #[error("transport error: {0}")]
    Transport(String),

    /// The session is in a sticky error state and must be reconnected.
    #[error("session failed with {0}; reconnect required")]
    SessionFailed(StatusCode),

    /// An operation needed a live connection but none exists.
    #[error("session is not connected")]
    NotConnected,

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Local Errors ─────────────────────────────────────────────
    /// Clipboard synchronisation failed.
    #[error("clipboard error: {0}")]
    Clipboard(#[from] ClipboardError),

    /// A connection type string did not name a known protocol.
    #[error("unknown connection kind: {0}")]
    UnknownConnectionKind(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── ClipboardError ───────────────────────────────────────────────

/// Errors raised while moving clipboard data between the host and the
/// remote session.
///
/// These never tear a session down; the bridge logs and drops them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClipboardError {
    /// The host clipboard could not be read.
    #[error("host clipboard read failed: {0}")]
    HostRead(String),

    /// The host clipboard could not be written.
    #[error("host clipboard write failed: {0}")]
    HostWrite(String),

    /// A remote clipboard stream closed before its end marker.
    #[error("clipboard stream ended before end-of-stream")]
    StreamAborted,

    /// No remote clipboard channel is attached (session not connected).
    #[error("remote clipboard channel unavailable")]
    RemoteUnavailable,

    /// Sending on a remote clipboard stream failed.
    #[error("clipboard send failed: {0}")]
    Send(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for ConsoleError {
    fn from(s: String) -> Self {
        ConsoleError::Other(s)
    }
}

impl From<&str> for ConsoleError {
    fn from(s: &str) -> Self {
        ConsoleError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for ConsoleError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        ConsoleError::ChannelClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for ConsoleError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        ConsoleError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = ConsoleError::SessionFailed(StatusCode::CLIENT_UNAUTHORIZED);
        assert!(e.to_string().contains("reconnect"));

        let e = ConsoleError::UnknownConnectionKind("telnet".into());
        assert!(e.to_string().contains("telnet"));
    }

    #[test]
    fn timeout_names_the_deadline() {
        let e = ConsoleError::Timeout(Duration::from_secs(5));
        assert_eq!(e.to_string(), "timeout after 5s");
    }

    #[test]
    fn from_string() {
        let e: ConsoleError = "something broke".into();
        assert!(matches!(e, ConsoleError::Other(_)));
    }

    #[test]
    fn from_clipboard() {
        let e: ConsoleError = ClipboardError::StreamAborted.into();
        assert!(matches!(e, ConsoleError::Clipboard(ClipboardError::StreamAborted)));
    }

    #[test]
    fn from_closed_channel() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<u8>();
        drop(rx);
        let e: ConsoleError = tx.send(1).unwrap_err().into();
        assert!(matches!(e, ConsoleError::ChannelClosed));
    }
}
