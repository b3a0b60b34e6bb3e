//! A host environment with no window behind it.
//!
//! Keeps geometry, fullscreen state and clipboard contents in memory.
//! Used by the CLI driver and by tests, which also use its counters and
//! the read gate to observe how a session talks to the host.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, broadcast};

use crate::clipboard::{ClipboardData, ClipboardPayload, LOCAL_SOURCE};
use crate::error::ClipboardError;
use crate::host::{HostClipboard, HostEnvironment, HostEvent, HostMetrics, ScreenSize, Viewport};

const EVENT_CAPACITY: usize = 32;

struct HeadlessInner {
    metrics: Mutex<HostMetrics>,
    clipboard: Mutex<Option<ClipboardData>>,
    events: broadcast::Sender<HostEvent>,
    reads: AtomicUsize,
    writes: Mutex<Vec<String>>,
    read_gate: Mutex<Option<Arc<Semaphore>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

/// In-memory host. Cloning shares the same state.
#[derive(Clone)]
pub struct HeadlessHost {
    inner: Arc<HeadlessInner>,
}

impl HeadlessHost {
    pub fn new(metrics: HostMetrics) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(HeadlessInner {
                metrics: Mutex::new(metrics),
                clipboard: Mutex::new(None),
                events,
                reads: AtomicUsize::new(0),
                writes: Mutex::new(Vec::new()),
                read_gate: Mutex::new(None),
                fail_reads: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
            }),
        }
    }

    /// A windowed host with the given container size and no header.
    pub fn with_viewport(width: f64, height: f64) -> Self {
        Self::new(HostMetrics {
            viewport: Viewport {
                width,
                height,
                header_height: 0.0,
            },
            screen: ScreenSize {
                width: 1920.0,
                height: 1080.0,
            },
            device_pixel_ratio: 1.0,
            fullscreen: false,
        })
    }

    // ── Geometry ─────────────────────────────────────────────────

    pub fn update_metrics(&self, f: impl FnOnce(&mut HostMetrics)) {
        f(&mut *self.inner.metrics.lock());
    }

    /// Resize the container and notify listeners.
    pub fn resize(&self, width: f64, height: f64) {
        self.update_metrics(|m| {
            m.viewport.width = width;
            m.viewport.height = height;
        });
        self.emit(HostEvent::Resize);
    }

    // ── Events ───────────────────────────────────────────────────

    /// Broadcast a notification. Returns how many listeners got it.
    pub fn emit(&self, event: HostEvent) -> usize {
        self.inner.events.send(event).unwrap_or(0)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.events.receiver_count()
    }

    // ── Clipboard ────────────────────────────────────────────────

    /// Replace the clipboard contents (as a local user copy would).
    pub fn set_clipboard(&self, data: ClipboardData) {
        *self.inner.clipboard.lock() = Some(data);
    }

    pub fn clipboard_contents(&self) -> Option<ClipboardData> {
        self.inner.clipboard.lock().clone()
    }

    /// How many times the clipboard has been read.
    pub fn read_count(&self) -> usize {
        self.inner.reads.load(Ordering::SeqCst)
    }

    /// Every text written to the clipboard, oldest first.
    pub fn written(&self) -> Vec<String> {
        self.inner.writes.lock().clone()
    }

    /// Park clipboard reads until [`release_reads`](Self::release_reads).
    pub fn hold_reads(&self) {
        *self.inner.read_gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_reads(&self) {
        if let Some(gate) = self.inner.read_gate.lock().take() {
            gate.close();
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl HostClipboard for HeadlessHost {
    async fn read(&self) -> Result<ClipboardData, ClipboardError> {
        self.inner.reads.fetch_add(1, Ordering::SeqCst);

        let gate = self.inner.read_gate.lock().clone();
        if let Some(gate) = gate {
            // A closed gate means the reads were released.
            let _ = gate.acquire().await;
        }

        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(ClipboardError::HostRead("clipboard access denied".into()));
        }
        Ok(self
            .clipboard_contents()
            .unwrap_or_else(|| ClipboardData::text(LOCAL_SOURCE, "")))
    }

    async fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(ClipboardError::HostWrite("clipboard is read-only".into()));
        }
        self.inner.writes.lock().push(text.to_string());
        *self.inner.clipboard.lock() = Some(ClipboardData {
            source: LOCAL_SOURCE.to_string(),
            mimetype: "text/plain".to_string(),
            payload: ClipboardPayload::Text(text.to_string()),
        });
        Ok(())
    }
}

impl HostEnvironment for HeadlessHost {
    fn metrics(&self) -> HostMetrics {
        *self.inner.metrics.lock()
    }

    fn set_fullscreen(&self, fullscreen: bool) {
        self.update_metrics(|m| m.fullscreen = fullscreen);
        self.emit(HostEvent::FullscreenChanged(fullscreen));
    }

    fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.inner.events.subscribe()
    }

    fn clipboard(&self) -> Arc<dyn HostClipboard> {
        Arc::new(self.clone())
    }
}
