//! # vmconsole-core
//!
//! Session core for interactive VNC/RDP/SSH consoles to virtual machines,
//! tunnelled through a remote-desktop transport.
//!
//! This crate contains:
//! - **State**: `ConnectionState` with sticky terminal errors, published through `StateCell`
//! - **Clipboard**: `ClipboardBridge`, host ⇄ remote sync with a single in-flight host read
//! - **Display**: `DisplayScaler` for remote resize and fit-to-viewport scaling, `RawFrame`
//! - **Input**: `InputForwarder` for pointer/keyboard pass-through and Ctrl-Alt-Del
//! - **Supervisor**: `ReconnectSupervisor`, scoped acquisition of transport, listeners and timers
//! - **Thumbnail**: `ThumbnailSampler`, rate-limited previews
//! - **Session**: `SessionManager` dispatch loop and the cloneable `SessionHandle`
//! - **Boundaries**: `RemoteTransport` and `HostEnvironment` traits, with the in-process
//!   `LoopbackTransport` and `HeadlessHost`
//! - **Error**: `ConsoleError` / `ClipboardError`, typed `thiserror` errors

pub mod clipboard;
pub mod config;
pub mod display;
pub mod error;
pub mod host;
pub mod input;
pub mod session;
pub mod state;
pub mod supervisor;
pub mod thumbnail;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use clipboard::{ClipboardBridge, ClipboardData, ClipboardPayload, HostDelivery, ResyncTrigger};
pub use config::SessionConfig;
pub use display::{DisplayScaler, PixelFormat, RawFrame};
pub use error::{ClipboardError, ConsoleError};
pub use host::{FocusTarget, HeadlessHost, HostClipboard, HostEnvironment, HostEvent, HostMetrics, ScreenSize, Viewport};
pub use input::{InputForwarder, KeyEvent, LocalInput, PointerButtons, PointerEvent};
pub use session::{
    ClientProperties, ConnectionKind, ConsoleTarget, Session, SessionCommand, SessionHandle, SessionId,
    SessionManager,
};
pub use state::{ConnectionPhase, ConnectionState, StateCell, StatusCode};
pub use supervisor::{LinkEvent, ReconnectSupervisor};
pub use thumbnail::{Thumbnail, ThumbnailSampler};
pub use transport::{
    ClipboardOutlet, ClipboardSink, ConnectParams, DisplayInfo, LoopbackProbe, LoopbackTransport, RemoteTransport,
    StreamChunk, TransportEvent, TransportFactory,
};
