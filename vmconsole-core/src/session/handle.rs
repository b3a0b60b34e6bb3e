//! Cloneable front end to a running [`SessionManager`](super::SessionManager).

use tokio::sync::{mpsc, oneshot, watch};

use crate::clipboard::ClipboardData;
use crate::error::ConsoleError;
use crate::input::{KeyEvent, LocalInput, PointerButtons};
use crate::session::SessionId;
use crate::state::{ConnectionPhase, ConnectionState};
use crate::thumbnail::Thumbnail;

/// Capacity of the command queue.
pub(crate) const COMMAND_QUEUE: usize = 64;

/// A request from the presentation layer to the session task.
#[derive(Debug)]
pub enum SessionCommand {
    Reconnect,
    /// Capture a thumbnail now, ignoring the rate limit.
    Screenshot(oneshot::Sender<Option<Thumbnail>>),
    ToggleFullscreen,
    SendCtrlAltDel,
    Input(LocalInput),
    /// Manual zoom; `None` returns to fit-to-viewport.
    SetScale(Option<f64>),
    Disconnect,
}

/// Handle to a session task. Dropping every handle unmounts the session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    commands: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<ConnectionState>,
    thumbnail: watch::Receiver<Option<Thumbnail>>,
    clipboard: watch::Receiver<Option<ClipboardData>>,
}

impl SessionHandle {
    pub(crate) fn new(
        id: SessionId,
        commands: mpsc::Sender<SessionCommand>,
        state: watch::Receiver<ConnectionState>,
        thumbnail: watch::Receiver<Option<Thumbnail>>,
        clipboard: watch::Receiver<Option<ClipboardData>>,
    ) -> Self {
        Self {
            id,
            commands,
            state,
            thumbnail,
            clipboard,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    // ── Observation ──────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn thumbnail(&self) -> Option<Thumbnail> {
        self.thumbnail.borrow().clone()
    }

    pub fn subscribe_thumbnail(&self) -> watch::Receiver<Option<Thumbnail>> {
        self.thumbnail.clone()
    }

    pub fn clipboard(&self) -> Option<ClipboardData> {
        self.clipboard.borrow().clone()
    }

    pub fn subscribe_clipboard(&self) -> watch::Receiver<Option<ClipboardData>> {
        self.clipboard.clone()
    }

    /// Wait until the session reaches a state matching `pred`.
    pub async fn wait_for(&self, pred: impl FnMut(&ConnectionState) -> bool) -> Result<ConnectionState, ConsoleError> {
        let mut rx = self.state.clone();
        let state = rx.wait_for(pred).await.map_err(|_| ConsoleError::ChannelClosed)?;
        Ok(*state)
    }

    /// Wait until the session reaches `phase`.
    pub async fn wait_for_phase(&self, phase: ConnectionPhase) -> Result<ConnectionState, ConsoleError> {
        self.wait_for(|s| s.phase() == phase).await
    }

    // ── Commands ─────────────────────────────────────────────────

    async fn send(&self, command: SessionCommand) -> Result<(), ConsoleError> {
        self.commands.send(command).await?;
        Ok(())
    }

    pub async fn reconnect(&self) -> Result<(), ConsoleError> {
        self.send(SessionCommand::Reconnect).await
    }

    /// Force a thumbnail capture. `None` when the session is not
    /// connected.
    pub async fn screenshot(&self) -> Result<Option<Thumbnail>, ConsoleError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Screenshot(tx)).await?;
        Ok(rx.await?)
    }

    pub async fn toggle_fullscreen(&self) -> Result<(), ConsoleError> {
        self.send(SessionCommand::ToggleFullscreen).await
    }

    pub async fn send_ctrl_alt_del(&self) -> Result<(), ConsoleError> {
        self.send(SessionCommand::SendCtrlAltDel).await
    }

    pub async fn key(&self, event: KeyEvent) -> Result<(), ConsoleError> {
        self.send(SessionCommand::Input(LocalInput::Key(event))).await
    }

    /// Pointer event in viewport coordinates.
    pub async fn pointer(&self, x: f64, y: f64, buttons: PointerButtons) -> Result<(), ConsoleError> {
        self.send(SessionCommand::Input(LocalInput::Pointer { x, y, buttons })).await
    }

    pub async fn set_scale(&self, scale: f64) -> Result<(), ConsoleError> {
        self.send(SessionCommand::SetScale(Some(scale))).await
    }

    pub async fn auto_fit(&self) -> Result<(), ConsoleError> {
        self.send(SessionCommand::SetScale(None)).await
    }

    pub async fn disconnect(&self) -> Result<(), ConsoleError> {
        self.send(SessionCommand::Disconnect).await
    }
}
