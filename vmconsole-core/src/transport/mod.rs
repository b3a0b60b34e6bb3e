//! Boundary to the remote-desktop transport.
//!
//! The transport turns a byte tunnel into display updates and clipboard
//! streams; this crate only drives it. Lifecycle notifications arrive
//! as [`TransportEvent`] messages on the channel returned by
//! [`RemoteTransport::connect`], so the session manager sees every
//! callback as one ordered stream.
//!
//! ```text
//!  SessionManager ──connect(params)──► RemoteTransport
//!        ▲                                   │
//!        └──── mpsc<TransportEvent> ◄────────┘
//!                 Connecting / Waiting / Connected / ...
//!                 ClientError(code) / TunnelError(code)
//!                 TunnelUnstable(flag)
//!                 Clipboard { mimetype, chunks }
//! ```

pub mod loopback;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::display::RawFrame;
use crate::error::{ClipboardError, ConsoleError};
use crate::input::{KeyEvent, PointerEvent};
use crate::state::StatusCode;

pub use loopback::{LoopbackProbe, LoopbackTransport};

// ── Events ───────────────────────────────────────────────────────

/// A notification from the transport, delivered in emission order.
#[derive(Debug)]
pub enum TransportEvent {
    Connecting,
    /// Handshake acknowledged.
    Waiting,
    /// First frame received.
    Connected,
    Disconnecting,
    Disconnected,
    ClientError(StatusCode),
    TunnelError(StatusCode),
    TunnelUnstable(bool),
    /// The remote pushed a clipboard value.
    Clipboard(InboundClipboard),
}

/// One element of a clipboard stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Text(String),
    Bytes(Bytes),
    End,
}

/// A clipboard stream opened by the remote.
///
/// Chunks arrive in order; the stream is complete at
/// [`StreamChunk::End`]. A channel closed before `End` is an aborted
/// transfer.
#[derive(Debug)]
pub struct InboundClipboard {
    pub mimetype: String,
    pub chunks: mpsc::Receiver<StreamChunk>,
}

// ── Display / connect parameters ─────────────────────────────────

/// Current state of the remote display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayInfo {
    /// Negotiated framebuffer width.
    pub width: u32,
    /// Negotiated framebuffer height.
    pub height: u32,
    /// Scale factor the renderer applies.
    pub scale: f64,
}

/// Everything the transport needs to open a tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub url: String,
    pub token: String,
    /// Initial framebuffer size request.
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
}

/// What a successful connect hands back: the event stream and the
/// outgoing clipboard channel.
pub struct TransportLink {
    pub events: mpsc::Receiver<TransportEvent>,
    pub clipboard: Arc<dyn ClipboardOutlet>,
}

// ── Traits ───────────────────────────────────────────────────────

/// Writable clipboard stream towards the remote.
#[async_trait]
pub trait ClipboardSink: Send {
    /// Send one text message.
    async fn send_text(&mut self, text: &str) -> Result<(), ClipboardError>;

    /// Send one binary chunk. Resolves once the remote acknowledged it.
    async fn send_chunk(&mut self, chunk: Bytes) -> Result<(), ClipboardError>;

    /// Close the stream.
    async fn send_end(&mut self) -> Result<(), ClipboardError>;
}

/// Factory for outgoing clipboard streams. Shared with clipboard tasks,
/// hence `Sync`.
pub trait ClipboardOutlet: Send + Sync {
    fn create_stream(&self, mimetype: &str) -> Result<Box<dyn ClipboardSink>, ClipboardError>;
}

/// The client/tunnel pair of one session.
///
/// Exclusively owned by a single session.
#[async_trait]
pub trait RemoteTransport: Send {
    /// Open the tunnel. Lifecycle events follow on the returned link.
    async fn connect(&mut self, params: &ConnectParams) -> Result<TransportLink, ConsoleError>;

    /// Close the tunnel.
    async fn disconnect(&mut self) -> Result<(), ConsoleError>;

    fn display(&self) -> DisplayInfo;

    /// Set the scale the renderer draws the framebuffer at.
    fn set_display_scale(&mut self, scale: f64);

    /// Ask the remote to resize its framebuffer.
    fn send_remote_size(&mut self, width: u32, height: u32) -> Result<(), ConsoleError>;

    fn send_key(&mut self, event: KeyEvent) -> Result<(), ConsoleError>;

    fn send_pointer(&mut self, event: PointerEvent) -> Result<(), ConsoleError>;

    /// Copy of the current framebuffer, if one has been received.
    fn framebuffer(&self) -> Option<RawFrame>;
}

/// Creates a fresh transport for every (re)connect.
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Box<dyn RemoteTransport>;
}

impl<F> TransportFactory for F
where
    F: Fn() -> Box<dyn RemoteTransport> + Send + Sync,
{
    fn create(&self) -> Box<dyn RemoteTransport> {
        self()
    }
}
