//! Bidirectional clipboard bridge between the host and the remote session.
//!
//! ```text
//!  host clipboard ──pull_from_host──► ClipboardBridge ──push_to_remote──► ClipboardSink
//!        ▲                                  │
//!        └────────── push_to_host ◄─────────┴──── receive_from_remote ◄── InboundClipboard
//! ```
//!
//! At most one host read is in flight: concurrent pulls share the same
//! future and its result. Every value moved in either direction
//! replaces the cached [`ClipboardData`], which observers follow
//! through a `watch` channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use crate::error::ClipboardError;
use crate::host::HostClipboard;
use crate::transport::{ClipboardOutlet, InboundClipboard, StreamChunk};

/// Source tag of values read from the host clipboard.
pub const LOCAL_SOURCE: &str = "local";

/// The only mimetype the host clipboard is written with.
pub const TEXT_PLAIN: &str = "text/plain";

/// Whether `mimetype` is sent and received as text.
pub fn is_textual(mimetype: &str) -> bool {
    mimetype.starts_with("text/")
}

// ── ClipboardData ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardPayload {
    Text(String),
    Blob(Bytes),
}

/// One clipboard value and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardData {
    /// Session id for remote values, [`LOCAL_SOURCE`] for host reads.
    pub source: String,
    pub mimetype: String,
    pub payload: ClipboardPayload,
}

impl ClipboardData {
    pub fn text(source: &str, text: &str) -> Self {
        Self {
            source: source.to_string(),
            mimetype: TEXT_PLAIN.to_string(),
            payload: ClipboardPayload::Text(text.to_string()),
        }
    }

    pub fn blob(source: &str, mimetype: &str, bytes: Bytes) -> Self {
        Self {
            source: source.to_string(),
            mimetype: mimetype.to_string(),
            payload: ClipboardPayload::Blob(bytes),
        }
    }

    /// Same mimetype and payload, regardless of source.
    fn same_content(&self, other: &ClipboardData) -> bool {
        self.mimetype == other.mimetype && self.payload == other.payload
    }
}

/// What [`ClipboardBridge::push_to_host`] did with a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostDelivery {
    /// Written to the host clipboard and cached.
    Written,
    /// Not `text/plain`: cached only.
    Cached,
}

/// Why a resync was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncTrigger {
    Connected,
    Focus,
    Copy,
    Cut,
}

impl std::fmt::Display for ResyncTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Focus => write!(f, "focus"),
            Self::Copy => write!(f, "copy"),
            Self::Cut => write!(f, "cut"),
        }
    }
}

// ── ClipboardBridge ──────────────────────────────────────────────

type HostRead = Shared<BoxFuture<'static, Result<ClipboardData, ClipboardError>>>;
type PendingRead = Arc<Mutex<Option<(u64, HostRead)>>>;

/// Clears the pending-read slot when the read it belongs to finishes
/// or is dropped.
struct ReleasePendingRead {
    slot: PendingRead,
    id: u64,
}

impl Drop for ReleasePendingRead {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if matches!(slot.as_ref(), Some((id, _)) if *id == self.id) {
            *slot = None;
        }
    }
}

/// Keeps the host and remote clipboards eventually consistent.
///
/// Shared between the session manager and the clipboard tasks it
/// spawns; every method takes `&self`.
pub struct ClipboardBridge {
    session_id: String,
    host: Arc<dyn HostClipboard>,
    outlet: Mutex<Option<Arc<dyn ClipboardOutlet>>>,
    pending_read: PendingRead,
    next_read: AtomicU64,
    latest: watch::Sender<Option<ClipboardData>>,
    chunk_size: usize,
}

impl ClipboardBridge {
    pub fn new(session_id: &str, host: Arc<dyn HostClipboard>, chunk_size: usize) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            session_id: session_id.to_string(),
            host,
            outlet: Mutex::new(None),
            pending_read: Arc::new(Mutex::new(None)),
            next_read: AtomicU64::new(0),
            latest,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Attach the remote clipboard channel of a fresh connection.
    pub fn attach(&self, outlet: Arc<dyn ClipboardOutlet>) {
        *self.outlet.lock() = Some(outlet);
    }

    pub fn detach(&self) {
        *self.outlet.lock() = None;
    }

    pub fn is_attached(&self) -> bool {
        self.outlet.lock().is_some()
    }

    /// The most recent value moved in either direction.
    pub fn latest(&self) -> Option<ClipboardData> {
        self.latest.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ClipboardData>> {
        self.latest.subscribe()
    }

    // ── Host → remote ────────────────────────────────────────────

    /// Read the host clipboard.
    ///
    /// Overlapping calls share one host read and all receive its
    /// result. The slot is released once that read completes, whether
    /// it succeeded or not.
    pub async fn pull_from_host(&self) -> Result<ClipboardData, ClipboardError> {
        let read = {
            let mut pending = self.pending_read.lock();
            match pending.as_ref() {
                Some((_, read)) => read.clone(),
                None => {
                    let id = self.next_read.fetch_add(1, Ordering::Relaxed);
                    let host = Arc::clone(&self.host);
                    let release = ReleasePendingRead {
                        slot: Arc::clone(&self.pending_read),
                        id,
                    };
                    let read = async move {
                        let _release = release;
                        host.read().await
                    }
                    .boxed()
                    .shared();
                    *pending = Some((id, read.clone()));
                    read
                }
            }
        };
        read.await
    }

    /// Upload `data` to the remote clipboard.
    ///
    /// Textual mimetypes go out as a single text message; anything else
    /// is streamed in chunks, each awaited until acknowledged. The
    /// stream is always closed with exactly one end marker.
    pub async fn push_to_remote(&self, data: &ClipboardData) -> Result<(), ClipboardError> {
        let outlet = self
            .outlet
            .lock()
            .clone()
            .ok_or(ClipboardError::RemoteUnavailable)?;
        let mut stream = outlet.create_stream(&data.mimetype)?;

        if is_textual(&data.mimetype) {
            let text = match &data.payload {
                ClipboardPayload::Text(text) => text.clone(),
                ClipboardPayload::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            };
            stream.send_text(&text).await?;
        } else {
            let bytes = match &data.payload {
                ClipboardPayload::Blob(bytes) => bytes.clone(),
                ClipboardPayload::Text(text) => Bytes::copy_from_slice(text.as_bytes()),
            };
            let mut offset = 0;
            while offset < bytes.len() {
                let end = (offset + self.chunk_size).min(bytes.len());
                stream.send_chunk(bytes.slice(offset..end)).await?;
                offset = end;
            }
        }
        stream.send_end().await?;

        self.latest.send_replace(Some(data.clone()));
        Ok(())
    }

    /// Pull the host clipboard and upload it.
    ///
    /// Skips the upload when the host still holds the value last moved
    /// through the bridge, unless `trigger` is a new connection.
    pub async fn sync_to_remote(&self, trigger: ResyncTrigger) -> Result<(), ClipboardError> {
        let data = self.pull_from_host().await?;
        let unchanged = self.latest.borrow().as_ref().is_some_and(|l| l.same_content(&data));
        if unchanged && trigger != ResyncTrigger::Connected {
            return Ok(());
        }
        self.push_to_remote(&data).await
    }

    /// [`sync_to_remote`](Self::sync_to_remote) with failures swallowed.
    ///
    /// Failures are only visible as debug logs in development builds.
    pub async fn resync(&self, trigger: ResyncTrigger) {
        if let Err(e) = self.sync_to_remote(trigger).await {
            if cfg!(debug_assertions) {
                debug!(session = %self.session_id, %trigger, "clipboard resync failed: {e}");
            }
        }
    }

    // ── Remote → host ────────────────────────────────────────────

    /// Write a remote value to the host.
    ///
    /// Only `text/plain` reaches the host clipboard; every value is
    /// cached.
    pub async fn push_to_host(&self, data: ClipboardData) -> Result<HostDelivery, ClipboardError> {
        let delivery = if data.mimetype == TEXT_PLAIN {
            let text = match &data.payload {
                ClipboardPayload::Text(text) => text.clone(),
                ClipboardPayload::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            };
            self.host.write_text(&text).await?;
            HostDelivery::Written
        } else {
            HostDelivery::Cached
        };
        self.latest.send_replace(Some(data));
        Ok(delivery)
    }

    /// Reassemble a remote clipboard stream and hand it to the host.
    ///
    /// Chunks are applied in arrival order. The value is delivered once,
    /// at end-of-stream; a stream closed early delivers nothing.
    pub async fn receive_from_remote(&self, inbound: InboundClipboard) -> Result<HostDelivery, ClipboardError> {
        let InboundClipboard { mimetype, mut chunks } = inbound;
        let mut buf = BytesMut::new();
        loop {
            match chunks.recv().await {
                Some(StreamChunk::Text(text)) => buf.extend_from_slice(text.as_bytes()),
                Some(StreamChunk::Bytes(bytes)) => buf.extend_from_slice(&bytes),
                Some(StreamChunk::End) => break,
                None => return Err(ClipboardError::StreamAborted),
            }
        }

        let payload = if is_textual(&mimetype) {
            ClipboardPayload::Text(String::from_utf8_lossy(&buf).into_owned())
        } else {
            ClipboardPayload::Blob(buf.freeze())
        };
        self.push_to_host(ClipboardData {
            source: self.session_id.clone(),
            mimetype,
            payload,
        })
        .await
    }
}

// ── Tests ────────────────────────────────────────────────────────
