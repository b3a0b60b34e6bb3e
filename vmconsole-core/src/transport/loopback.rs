//! In-process transport that plays the remote side itself.
//!
//! [`LoopbackTransport`] accepts every request immediately: it reports
//! the handshake as soon as it is connected, applies resize requests to
//! its own display, synthesises a framebuffer, and can echo clipboard
//! uploads back as remote clipboard pushes. A [`LoopbackProbe`] shares
//! its state, so a driver can inject events and inspect what the
//! session sent.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::display::{PixelFormat, RawFrame};
use crate::error::{ClipboardError, ConsoleError};
use crate::input::{KeyEvent, PointerEvent};
use crate::transport::{
    ClipboardOutlet, ClipboardSink, ConnectParams, DisplayInfo, InboundClipboard, RemoteTransport,
    StreamChunk, TransportEvent, TransportFactory, TransportLink,
};

/// Capacity of the lifecycle event queue.
const EVENT_QUEUE: usize = 64;

/// Display size used when the connect request carries none.
const FALLBACK_SIZE: (u32, u32) = (1024, 768);

/// A call observed on an outgoing clipboard stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardCall {
    Text(String),
    Chunk(Bytes),
    End,
}

/// How the simulated remote behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopbackBehaviour {
    /// Emit `Connecting → Waiting → Connected` on connect.
    pub auto_handshake: bool,
    /// Apply resize requests to the display.
    pub accept_resize: bool,
    /// Push every uploaded clipboard value back to the session.
    pub echo_clipboard: bool,
    /// Refuse to connect.
    pub fail_connect: bool,
    /// Never complete a disconnect request.
    pub stall_disconnect: bool,
}

impl Default for LoopbackBehaviour {
    fn default() -> Self {
        Self {
            auto_handshake: true,
            accept_resize: true,
            echo_clipboard: false,
            fail_connect: false,
            stall_disconnect: false,
        }
    }
}

#[derive(Default)]
struct ProbeState {
    behaviour: LoopbackBehaviour,
    events: Option<mpsc::Sender<TransportEvent>>,
    connects: usize,
    disconnects: usize,
    last_params: Option<ConnectParams>,
    opened_streams: Vec<String>,
    clipboard_calls: Vec<ClipboardCall>,
    resize_requests: Vec<(u32, u32)>,
    applied_scales: Vec<f64>,
    keys: Vec<KeyEvent>,
    pointers: Vec<PointerEvent>,
}

// ── LoopbackProbe ────────────────────────────────────────────────

/// Shared view into every [`LoopbackTransport`] it created.
#[derive(Clone, Default)]
pub struct LoopbackProbe {
    inner: Arc<Mutex<ProbeState>>,
}

impl LoopbackProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behaviour(behaviour: LoopbackBehaviour) -> Self {
        let probe = Self::default();
        probe.inner.lock().behaviour = behaviour;
        probe
    }

    pub fn set_behaviour(&self, behaviour: LoopbackBehaviour) {
        self.inner.lock().behaviour = behaviour;
    }

    pub fn behaviour(&self) -> LoopbackBehaviour {
        self.inner.lock().behaviour
    }

    /// A transport reporting into this probe.
    pub fn transport(&self) -> LoopbackTransport {
        LoopbackTransport {
            probe: self.clone(),
            display: DisplayInfo {
                width: 0,
                height: 0,
                scale: 1.0,
            },
            connected: false,
        }
    }

    /// Factory handing out a new transport per connect.
    pub fn factory(&self) -> Arc<dyn TransportFactory> {
        let probe = self.clone();
        Arc::new(move || Box::new(probe.transport()) as Box<dyn RemoteTransport>)
    }

    // ── Injection ────────────────────────────────────────────────

    /// Deliver an event as if the remote had emitted it.
    pub fn emit(&self, event: TransportEvent) -> Result<(), ConsoleError> {
        let tx = self.inner.lock().events.clone().ok_or(ConsoleError::NotConnected)?;
        tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ConsoleError::Transport("event queue full".into()),
            mpsc::error::TrySendError::Closed(_) => ConsoleError::ChannelClosed,
        })
    }

    /// Open a remote clipboard stream carrying `chunks`.
    ///
    /// The chunks are queued verbatim; include [`StreamChunk::End`] to
    /// complete the transfer.
    pub fn push_clipboard(&self, mimetype: &str, chunks: Vec<StreamChunk>) -> Result<(), ConsoleError> {
        let (tx, rx) = mpsc::channel(chunks.len().max(1));
        for chunk in chunks {
            tx.try_send(chunk).map_err(|_| ConsoleError::ChannelClosed)?;
        }
        self.emit(TransportEvent::Clipboard(InboundClipboard {
            mimetype: mimetype.to_string(),
            chunks: rx,
        }))
    }

    // ── Inspection ───────────────────────────────────────────────

    /// Number of registered event listeners still attached (0 or 1).
    pub fn live_handlers(&self) -> usize {
        match &self.inner.lock().events {
            Some(tx) if !tx.is_closed() => 1,
            _ => 0,
        }
    }

    pub fn connects(&self) -> usize {
        self.inner.lock().connects
    }

    pub fn disconnects(&self) -> usize {
        self.inner.lock().disconnects
    }

    pub fn last_params(&self) -> Option<ConnectParams> {
        self.inner.lock().last_params.clone()
    }

    pub fn opened_streams(&self) -> Vec<String> {
        self.inner.lock().opened_streams.clone()
    }

    pub fn clipboard_calls(&self) -> Vec<ClipboardCall> {
        self.inner.lock().clipboard_calls.clone()
    }

    pub fn resize_requests(&self) -> Vec<(u32, u32)> {
        self.inner.lock().resize_requests.clone()
    }

    pub fn applied_scales(&self) -> Vec<f64> {
        self.inner.lock().applied_scales.clone()
    }

    pub fn keys(&self) -> Vec<KeyEvent> {
        self.inner.lock().keys.clone()
    }

    pub fn pointers(&self) -> Vec<PointerEvent> {
        self.inner.lock().pointers.clone()
    }
}

// ── LoopbackTransport ────────────────────────────────────────────

pub struct LoopbackTransport {
    probe: LoopbackProbe,
    display: DisplayInfo,
    connected: bool,
}

impl LoopbackTransport {
    fn require_connected(&self) -> Result<(), ConsoleError> {
        if self.connected {
            Ok(())
        } else {
            Err(ConsoleError::NotConnected)
        }
    }
}

#[async_trait]
impl RemoteTransport for LoopbackTransport {
    async fn connect(&mut self, params: &ConnectParams) -> Result<TransportLink, ConsoleError> {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE);
        {
            let mut st = self.probe.inner.lock();
            st.connects += 1;
            st.last_params = Some(params.clone());
            if st.behaviour.fail_connect {
                return Err(ConsoleError::Transport(format!("cannot reach {}", params.url)));
            }
            if st.behaviour.auto_handshake {
                for event in [
                    TransportEvent::Connecting,
                    TransportEvent::Waiting,
                    TransportEvent::Connected,
                ] {
                    let _ = tx.try_send(event);
                }
            }
            st.events = Some(tx);
        }

        let (width, height) = if params.width == 0 || params.height == 0 {
            FALLBACK_SIZE
        } else {
            (params.width, params.height)
        };
        self.display = DisplayInfo {
            width,
            height,
            scale: 1.0,
        };
        self.connected = true;
        debug!("loopback connected to {} at {width}x{height}", params.url);

        Ok(TransportLink {
            events: rx,
            clipboard: Arc::new(LoopbackOutlet {
                probe: self.probe.clone(),
            }),
        })
    }

    async fn disconnect(&mut self) -> Result<(), ConsoleError> {
        self.require_connected()?;
        if self.probe.behaviour().stall_disconnect {
            std::future::pending::<()>().await;
        }
        self.connected = false;
        self.probe.inner.lock().disconnects += 1;
        let _ = self.probe.emit(TransportEvent::Disconnecting);
        let _ = self.probe.emit(TransportEvent::Disconnected);
        Ok(())
    }

    fn display(&self) -> DisplayInfo {
        self.display
    }

    fn set_display_scale(&mut self, scale: f64) {
        self.display.scale = scale;
        self.probe.inner.lock().applied_scales.push(scale);
    }

    fn send_remote_size(&mut self, width: u32, height: u32) -> Result<(), ConsoleError> {
        self.require_connected()?;
        let accept = {
            let mut st = self.probe.inner.lock();
            st.resize_requests.push((width, height));
            st.behaviour.accept_resize
        };
        if accept {
            self.display.width = width;
            self.display.height = height;
        }
        Ok(())
    }

    fn send_key(&mut self, event: KeyEvent) -> Result<(), ConsoleError> {
        self.require_connected()?;
        self.probe.inner.lock().keys.push(event);
        Ok(())
    }

    fn send_pointer(&mut self, event: PointerEvent) -> Result<(), ConsoleError> {
        self.require_connected()?;
        self.probe.inner.lock().pointers.push(event);
        Ok(())
    }

    fn framebuffer(&self) -> Option<RawFrame> {
        if !self.connected {
            return None;
        }
        let mut frame = RawFrame::blank(self.display.width, self.display.height, PixelFormat::Bgra8);
        let stride = frame.stride as usize;
        for y in 0..frame.height as usize {
            for x in 0..frame.width as usize {
                let off = y * stride + x * 4;
                frame.data[off..off + 4].copy_from_slice(&[x as u8, y as u8, (x ^ y) as u8, 0xFF]);
            }
        }
        Some(frame)
    }
}

// ── Clipboard streams ────────────────────────────────────────────

struct LoopbackOutlet {
    probe: LoopbackProbe,
}

impl ClipboardOutlet for LoopbackOutlet {
    fn create_stream(&self, mimetype: &str) -> Result<Box<dyn ClipboardSink>, ClipboardError> {
        self.probe.inner.lock().opened_streams.push(mimetype.to_string());
        Ok(Box::new(LoopbackSink {
            probe: self.probe.clone(),
            mimetype: mimetype.to_string(),
            sent: Vec::new(),
            ended: false,
        }))
    }
}

struct LoopbackSink {
    probe: LoopbackProbe,
    mimetype: String,
    sent: Vec<StreamChunk>,
    ended: bool,
}

impl LoopbackSink {
    fn record(&mut self, call: ClipboardCall) -> Result<(), ClipboardError> {
        if self.ended {
            return Err(ClipboardError::Send("stream already ended".into()));
        }
        self.probe.inner.lock().clipboard_calls.push(call);
        Ok(())
    }
}

#[async_trait]
impl ClipboardSink for LoopbackSink {
    async fn send_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        self.record(ClipboardCall::Text(text.to_string()))?;
        self.sent.push(StreamChunk::Text(text.to_string()));
        Ok(())
    }

    async fn send_chunk(&mut self, chunk: Bytes) -> Result<(), ClipboardError> {
        self.record(ClipboardCall::Chunk(chunk.clone()))?;
        self.sent.push(StreamChunk::Bytes(chunk));
        Ok(())
    }

    async fn send_end(&mut self) -> Result<(), ClipboardError> {
        self.record(ClipboardCall::End)?;
        self.ended = true;

        if self.probe.behaviour().echo_clipboard {
            let mut chunks = std::mem::take(&mut self.sent);
            chunks.push(StreamChunk::End);
            self.probe
                .push_clipboard(&self.mimetype, chunks)
                .map_err(|e| ClipboardError::Send(e.to_string()))?;
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
