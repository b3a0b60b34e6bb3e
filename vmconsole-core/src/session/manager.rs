//! Session composition and event dispatch.
//!
//! The manager owns every per-session component and is the only writer
//! of the connection state. Transport notifications, host notifications,
//! poll ticks and presentation commands all arrive as messages and are
//! dispatched one at a time from [`SessionManager::run`]:
//!
//! ```text
//!   SessionHandle ──SessionCommand──┐
//!                                   ▼
//!   RemoteTransport ──TransportEvent──► SessionManager ──► StateCell
//!   HostEnvironment ──HostEvent───────►   │  │  │
//!   resize poll ──tick────────────────►   │  │  └──► ThumbnailSampler
//!                                         │  └─────► DisplayScaler
//!                                         └────────► ClipboardBridge
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::clipboard::{ClipboardBridge, ClipboardData, ResyncTrigger};
use crate::config::SessionConfig;
use crate::display::DisplayScaler;
use crate::error::ConsoleError;
use crate::host::{FocusTarget, HostEnvironment, HostEvent};
use crate::input::{InputForwarder, LocalInput};
use crate::session::handle::COMMAND_QUEUE;
use crate::session::{ClientProperties, ConsoleTarget, Session, SessionCommand, SessionHandle};
use crate::state::{ConnectionPhase, ConnectionState, StatusCode};
use crate::supervisor::{LinkEvent, ReconnectSupervisor};
use crate::thumbnail::{Thumbnail, ThumbnailSampler};
use crate::transport::{ConnectParams, InboundClipboard, RemoteTransport, TransportEvent, TransportFactory};

/// What the run loop woke up for.
enum Step {
    Command(Option<SessionCommand>),
    Link(LinkEvent),
}

/// Owns one console session and everything attached to it.
pub struct SessionManager {
    session: Session,
    target: ConsoleTarget,
    config: SessionConfig,
    host: Arc<dyn HostEnvironment>,
    supervisor: ReconnectSupervisor,
    clipboard: Arc<ClipboardBridge>,
    scaler: DisplayScaler,
    sampler: ThumbnailSampler,
    commands: mpsc::Receiver<SessionCommand>,
}

impl SessionManager {
    /// Build a session for `target`. Nothing connects until
    /// [`connect`](Self::connect) or [`run`](Self::run).
    pub fn new(
        target: ConsoleTarget,
        config: SessionConfig,
        host: Arc<dyn HostEnvironment>,
        factory: Arc<dyn TransportFactory>,
    ) -> (Self, SessionHandle) {
        let id = target.session_id();
        let session = Session::new(id.clone(), target.kind);
        let clipboard = Arc::new(ClipboardBridge::new(
            id.as_str(),
            host.clipboard(),
            config.clipboard_chunk_size,
        ));
        let scaler = DisplayScaler::new(target.kind, config.max_zoom).with_resize_retry(config.resize_retry_interval());
        let sampler = ThumbnailSampler::from_config(&config);
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);

        let handle = SessionHandle::new(
            id,
            tx,
            session.state.subscribe(),
            sampler.subscribe(),
            clipboard.subscribe(),
        );
        let manager = Self {
            session,
            target,
            config,
            supervisor: ReconnectSupervisor::new(factory, Arc::clone(&host)),
            host,
            clipboard,
            scaler,
            sampler,
            commands: rx,
        };
        (manager, handle)
    }

    // ── Observation ──────────────────────────────────────────────

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state.get()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.session.state.subscribe()
    }

    pub fn properties(&self) -> &ClientProperties {
        &self.session.properties
    }

    pub fn thumbnail(&self) -> Option<Thumbnail> {
        self.sampler.latest()
    }

    pub fn clipboard(&self) -> Option<ClipboardData> {
        self.clipboard.latest()
    }

    pub fn pending_timers(&self) -> usize {
        self.supervisor.pending_timers()
    }

    pub fn registered_listeners(&self) -> usize {
        self.supervisor.registered_listeners()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Parameters for a fresh connection, sized to the current viewport.
    pub fn connect_params(&self) -> ConnectParams {
        let metrics = self.host.metrics();
        let (width, height) = DisplayScaler::target_remote_size(&metrics);
        ConnectParams {
            url: self.target.url(),
            token: self.target.token.clone(),
            width,
            height,
            dpi: DisplayScaler::dpi(&metrics),
        }
    }

    pub async fn connect(&mut self) -> Result<(), ConsoleError> {
        let params = self.connect_params();
        self.scaler.reset();
        let outlet = self.supervisor.connect(&self.session.state, &params).await?;
        self.clipboard.attach(outlet);
        Ok(())
    }

    pub async fn disconnect(&mut self) -> Result<(), ConsoleError> {
        self.clipboard.detach();
        self.supervisor.disconnect(&self.session.state).await
    }

    /// Tear down and connect again. The only way out of an error state.
    pub async fn reconnect(&mut self) -> Result<(), ConsoleError> {
        info!(session = %self.session.id, "reconnecting");
        self.clipboard.detach();
        let params = self.connect_params();
        self.scaler.reset();
        let outlet = self.supervisor.reconnect(&self.session.state, &params).await?;
        self.clipboard.attach(outlet);
        Ok(())
    }

    /// Release the link after the transport ended the connection.
    fn teardown_link(&mut self) {
        self.clipboard.detach();
        self.supervisor.release();
    }

    /// Release the link after a fault. The transport is still asked to
    /// close; the sticky state keeps its phase writes out.
    async fn abort_link(&mut self) {
        self.clipboard.detach();
        if let Err(e) = self.supervisor.shutdown().await {
            debug!(session = %self.session.id, "teardown after fault: {e}");
        }
    }

    // ── Operations ───────────────────────────────────────────────

    /// Capture a thumbnail now. `None` unless connected.
    pub fn screenshot(&self) -> Option<Thumbnail> {
        let transport = self.supervisor.transport()?;
        self.sampler
            .capture(self.session.state.phase(), transport, Instant::now())
    }

    /// Flip host fullscreen and resize right away.
    pub fn toggle_fullscreen(&mut self) {
        let fullscreen = !self.host.metrics().fullscreen;
        self.host.set_fullscreen(fullscreen);
        self.recompute_display();
    }

    pub fn send_ctrl_alt_del(&mut self) -> Result<(), ConsoleError> {
        let transport = self.connected_transport()?;
        InputForwarder::send_ctrl_alt_del(transport)
    }

    /// Forward local input. Returns `false` if it was dropped.
    pub fn forward_input(&mut self, input: LocalInput) -> Result<bool, ConsoleError> {
        let props = self.session.properties;
        let transport = self.connected_transport()?;
        InputForwarder::forward(transport, &props, input)
    }

    /// Manual zoom, or back to auto-fit with `None`.
    pub fn set_scale(&mut self, scale: Option<f64>) {
        match scale {
            Some(scale) => {
                if let Some(transport) = self.supervisor.transport_mut() {
                    self.scaler
                        .apply_manual_scale(transport, &mut self.session.properties, scale);
                } else {
                    self.session.properties.set_scale(scale);
                }
            }
            None => {
                self.session.properties.enable_auto_fit();
                self.recompute_display();
            }
        }
    }

    fn connected_transport(&mut self) -> Result<&mut (dyn RemoteTransport + 'static), ConsoleError> {
        if !self.session.state.phase().is_connected() {
            return Err(ConsoleError::NotConnected);
        }
        self.supervisor.transport_mut().ok_or(ConsoleError::NotConnected)
    }

    /// Re-run both scaler computations against the current geometry.
    fn recompute_display(&mut self) {
        if !self.session.state.phase().is_connected() {
            return;
        }
        let metrics = self.host.metrics();
        let Some(transport) = self.supervisor.transport_mut() else {
            return;
        };
        if let Err(e) = self.scaler.recompute_remote_size(transport, &metrics, Instant::now()) {
            warn!(session = %self.session.id, "resize request failed: {e}");
        }
        self.scaler
            .recompute_scale(transport, &metrics, &mut self.session.properties);
    }

    fn maybe_sample_thumbnail(&self) {
        if let Some(transport) = self.supervisor.transport() {
            self.sampler
                .maybe_sample(self.session.state.phase(), transport, Instant::now());
        }
    }

    fn spawn_resync(&mut self, trigger: ResyncTrigger) {
        let bridge = Arc::clone(&self.clipboard);
        self.supervisor.spawn(async move { bridge.resync(trigger).await });
    }

    fn spawn_receive(&mut self, inbound: InboundClipboard) {
        let bridge = Arc::clone(&self.clipboard);
        let id = self.session.id.clone();
        self.supervisor.spawn(async move {
            if let Err(e) = bridge.receive_from_remote(inbound).await {
                if cfg!(debug_assertions) {
                    debug!(session = %id, "remote clipboard dropped: {e}");
                }
            }
        });
    }

    // ── Dispatch ─────────────────────────────────────────────────

    /// Returns whether the session entered `phase` just now.
    fn set_phase(&mut self, phase: ConnectionPhase, status: Option<StatusCode>) -> bool {
        let before = self.session.state.phase();
        if self.session.state.set(phase, status) {
            info!(session = %self.session.id, "{}", self.session.state.get().label());
        }
        if phase != ConnectionPhase::Connected {
            self.supervisor.stop_resize_poll();
        }
        before != phase && self.session.state.phase() == phase
    }

    fn on_connected(&mut self) {
        self.supervisor.start_resize_poll(self.config.resize_poll_interval());
        self.recompute_display();
        if self.clipboard.is_attached() {
            self.spawn_resync(ResyncTrigger::Connected);
        }
        self.maybe_sample_thumbnail();
    }

    /// Apply one transport notification.
    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connecting => {
                self.set_phase(ConnectionPhase::Connecting, None);
            }
            TransportEvent::Waiting => {
                self.set_phase(ConnectionPhase::Waiting, None);
            }
            TransportEvent::Connected => {
                if self.set_phase(ConnectionPhase::Connected, None) {
                    self.on_connected();
                }
            }
            TransportEvent::Disconnecting => {
                self.set_phase(ConnectionPhase::Disconnecting, None);
            }
            TransportEvent::Disconnected => {
                self.set_phase(ConnectionPhase::Disconnected, None);
                self.teardown_link();
            }
            TransportEvent::ClientError(code) => {
                error!(session = %self.session.id, "client error: {code}");
                self.set_phase(ConnectionPhase::ClientError, Some(code));
                self.abort_link().await;
            }
            TransportEvent::TunnelError(code) => {
                error!(session = %self.session.id, "tunnel error: {code}");
                self.set_phase(ConnectionPhase::TunnelError, Some(code));
                self.abort_link().await;
            }
            TransportEvent::TunnelUnstable(unstable) => {
                if self.session.state.set_tunnel_unstable(unstable) && unstable {
                    warn!(session = %self.session.id, "tunnel unstable");
                }
            }
            TransportEvent::Clipboard(inbound) => self.spawn_receive(inbound),
        }
    }

    /// The transport dropped its event channel without saying goodbye.
    async fn on_transport_closed(&mut self) {
        match self.session.state.phase() {
            ConnectionPhase::Disconnecting | ConnectionPhase::Disconnected => self.teardown_link(),
            _ => {
                warn!(session = %self.session.id, "transport went away");
                self.set_phase(ConnectionPhase::TunnelError, Some(StatusCode::UPSTREAM_ERROR));
                self.abort_link().await;
            }
        }
    }

    /// Apply one host notification.
    pub fn handle_host_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::Focus(FocusTarget::Window) => self.spawn_resync(ResyncTrigger::Focus),
            HostEvent::Focus(FocusTarget::Descendant) => {}
            HostEvent::Copy => self.spawn_resync(ResyncTrigger::Copy),
            HostEvent::Cut => self.spawn_resync(ResyncTrigger::Cut),
            HostEvent::Resize | HostEvent::FullscreenChanged(_) => self.recompute_display(),
        }
    }

    fn on_resize_tick(&mut self) {
        self.recompute_display();
        self.maybe_sample_thumbnail();
    }

    async fn dispatch(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Transport(Some(event)) => self.handle_transport_event(event).await,
            LinkEvent::Transport(None) => self.on_transport_closed().await,
            LinkEvent::Host(event) => self.handle_host_event(event),
            LinkEvent::ResizeTick => self.on_resize_tick(),
            LinkEvent::TaskFinished(Err(e)) if e.is_panic() => {
                error!(session = %self.session.id, "clipboard task panicked: {e}");
            }
            LinkEvent::TaskFinished(_) => {}
        }
    }

    /// Wait for the next link event and dispatch it.
    ///
    /// Never resolves while there is no link.
    pub async fn process_next(&mut self) {
        let event = self.supervisor.next_event().await;
        self.dispatch(event).await;
    }

    async fn execute(&mut self, command: SessionCommand) {
        let result = match command {
            SessionCommand::Reconnect => self.reconnect().await,
            SessionCommand::Screenshot(reply) => {
                let _ = reply.send(self.screenshot());
                Ok(())
            }
            SessionCommand::ToggleFullscreen => {
                self.toggle_fullscreen();
                Ok(())
            }
            SessionCommand::SendCtrlAltDel => self.send_ctrl_alt_del(),
            SessionCommand::Input(input) => self.forward_input(input).map(|_| ()),
            SessionCommand::SetScale(scale) => {
                self.set_scale(scale);
                Ok(())
            }
            // Handled by the run loop.
            SessionCommand::Disconnect => Ok(()),
        };
        if let Err(e) = result {
            warn!(session = %self.session.id, "command failed: {e}");
        }
    }

    // ── Run loop ─────────────────────────────────────────────────

    /// Mount the session and serve it until a disconnect command or the
    /// last [`SessionHandle`] is dropped. Everything attached to the
    /// connection is released before this returns.
    pub async fn run(&mut self) {
        if let Err(e) = self.connect().await {
            warn!(session = %self.session.id, "initial connect failed: {e}");
        }

        loop {
            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                event = self.supervisor.next_event() => Step::Link(event),
            };

            match step {
                Step::Command(None) | Step::Command(Some(SessionCommand::Disconnect)) => break,
                Step::Command(Some(command)) => self.execute(command).await,
                Step::Link(event) => self.dispatch(event).await,
            }
        }

        if let Err(e) = self.disconnect().await {
            debug!(session = %self.session.id, "disconnect on unmount: {e}");
        }
        info!(session = %self.session.id, "session closed");
    }
}

// ── Tests ────────────────────────────────────────────────────────
