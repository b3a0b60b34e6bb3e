//! Lifecycle of the transport handle and everything attached to it.
//!
//! One connection is one [`ActiveLink`]: the transport, its event
//! receiver, the host notification subscription, the resize-poll timer
//! and the background clipboard tasks. They are acquired together and
//! released together by dropping the link, so no listener or timer can
//! outlive the connection it belongs to, whichever way it ends.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::ConsoleError;
use crate::host::{HostEnvironment, HostEvent};
use crate::state::{ConnectionPhase, StateCell, StatusCode};
use crate::transport::{ClipboardOutlet, ConnectParams, RemoteTransport, TransportEvent, TransportFactory};

/// How long the transport gets to close before the link is dropped anyway.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Resources held for the duration of one connection.
struct ActiveLink {
    transport: Box<dyn RemoteTransport>,
    events: mpsc::Receiver<TransportEvent>,
    host_events: Option<broadcast::Receiver<HostEvent>>,
    resize_poll: Option<Interval>,
    tasks: JoinSet<()>,
}

/// Something that happened on the active link.
#[derive(Debug)]
pub enum LinkEvent {
    /// A transport notification; `None` once the transport closed its
    /// event channel.
    Transport(Option<TransportEvent>),
    Host(HostEvent),
    ResizeTick,
    /// A background task finished.
    TaskFinished(Result<(), JoinError>),
}

/// Creates, replaces and tears down the transport of one session.
pub struct ReconnectSupervisor {
    factory: Arc<dyn TransportFactory>,
    host: Arc<dyn HostEnvironment>,
    link: Option<ActiveLink>,
}

impl ReconnectSupervisor {
    pub fn new(factory: Arc<dyn TransportFactory>, host: Arc<dyn HostEnvironment>) -> Self {
        Self {
            factory,
            host,
            link: None,
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Open a fresh transport and register its listeners.
    ///
    /// Refused while `state` holds a terminal error; use
    /// [`reconnect`](Self::reconnect). A previous link, if any, is
    /// released first. On failure nothing stays registered and the
    /// state moves to `TunnelError`.
    pub async fn connect(
        &mut self,
        state: &StateCell,
        params: &ConnectParams,
    ) -> Result<Arc<dyn ClipboardOutlet>, ConsoleError> {
        let current = state.get();
        if current.phase().is_error() {
            return Err(ConsoleError::SessionFailed(current.status_code()));
        }
        self.release();

        let mut transport = self.factory.create();
        let host_events = self.host.subscribe();
        state.set(ConnectionPhase::Connecting, None);
        info!("connecting to {}", params.url);

        match transport.connect(params).await {
            Ok(link) => {
                self.link = Some(ActiveLink {
                    transport,
                    events: link.events,
                    host_events: Some(host_events),
                    resize_poll: None,
                    tasks: JoinSet::new(),
                });
                Ok(link.clipboard)
            }
            Err(e) => {
                warn!("connect to {} failed: {e}", params.url);
                state.set(ConnectionPhase::TunnelError, Some(StatusCode::SERVER_ERROR));
                Err(e)
            }
        }
    }

    /// Close the transport and release the link.
    ///
    /// The link is dropped on every path, including a failed transport
    /// teardown and cancellation of this future.
    pub async fn disconnect(&mut self, state: &StateCell) -> Result<(), ConsoleError> {
        let Some(mut link) = self.link.take() else {
            return Ok(());
        };
        link.resize_poll = None;

        state.set(ConnectionPhase::Disconnecting, None);
        let result = close_transport(link.transport.as_mut()).await;
        if let Err(e) = &result {
            warn!("transport teardown failed: {e}");
        }
        state.set(ConnectionPhase::Disconnected, None);
        drop(link);
        result
    }

    /// Ask the transport to close, then release the link, leaving the
    /// session state alone.
    ///
    /// Used after a fault, when the state already says why the link
    /// ended. The link is dropped whatever the transport answers.
    pub async fn shutdown(&mut self) -> Result<(), ConsoleError> {
        let Some(mut link) = self.link.take() else {
            return Ok(());
        };
        link.resize_poll = None;
        let result = close_transport(link.transport.as_mut()).await;
        drop(link);
        debug!("link shut down");
        result
    }

    /// Disconnect, clear the session state (including a sticky error)
    /// and connect again.
    pub async fn reconnect(
        &mut self,
        state: &StateCell,
        params: &ConnectParams,
    ) -> Result<Arc<dyn ClipboardOutlet>, ConsoleError> {
        if let Err(e) = self.disconnect(state).await {
            debug!("ignoring teardown error before reconnect: {e}");
        }
        state.reset();
        self.connect(state, params).await
    }

    /// Drop the link without talking to the transport.
    ///
    /// Used once the transport has already ended the connection.
    pub fn release(&mut self) {
        if self.link.take().is_some() {
            debug!("link released");
        }
    }

    pub fn is_linked(&self) -> bool {
        self.link.is_some()
    }

    // ── Timers and tasks ─────────────────────────────────────────

    /// Start the periodic resize poll. Restarts it if already running.
    pub fn start_resize_poll(&mut self, period: Duration) {
        if let Some(link) = self.link.as_mut() {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            link.resize_poll = Some(interval);
        }
    }

    pub fn stop_resize_poll(&mut self) {
        if let Some(link) = self.link.as_mut() {
            link.resize_poll = None;
        }
    }

    /// Run `task` for as long as the link lives. Returns `false` (and
    /// drops the task) when there is no link.
    pub fn spawn<F>(&mut self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.link.as_mut() {
            Some(link) => {
                link.tasks.spawn(task);
                true
            }
            None => false,
        }
    }

    /// Number of armed timers.
    pub fn pending_timers(&self) -> usize {
        self.link
            .as_ref()
            .map_or(0, |link| usize::from(link.resize_poll.is_some()))
    }

    /// Number of registered listeners: the transport event receiver and
    /// the host subscription.
    pub fn registered_listeners(&self) -> usize {
        self.link
            .as_ref()
            .map_or(0, |link| 1 + usize::from(link.host_events.is_some()))
    }

    /// Number of background tasks still running on the link.
    pub fn running_tasks(&self) -> usize {
        self.link.as_ref().map_or(0, |link| link.tasks.len())
    }

    // ── Access ───────────────────────────────────────────────────

    pub fn transport(&self) -> Option<&(dyn RemoteTransport + 'static)> {
        self.link.as_ref().map(|link| link.transport.as_ref())
    }

    pub fn transport_mut(&mut self) -> Option<&mut (dyn RemoteTransport + 'static)> {
        self.link.as_mut().map(|link| link.transport.as_mut())
    }

    // ── Event loop ───────────────────────────────────────────────

    /// Wait for the next event on the link. Never resolves without one.
    pub async fn next_event(&mut self) -> LinkEvent {
        let Some(link) = self.link.as_mut() else {
            return std::future::pending().await;
        };

        tokio::select! {
            event = link.events.recv() => LinkEvent::Transport(event),
            event = recv_host(&mut link.host_events) => LinkEvent::Host(event),
            _ = tick(&mut link.resize_poll) => LinkEvent::ResizeTick,
            Some(result) = link.tasks.join_next(), if !link.tasks.is_empty() => LinkEvent::TaskFinished(result),
        }
    }
}

async fn close_transport(transport: &mut dyn RemoteTransport) -> Result<(), ConsoleError> {
    tokio::time::timeout(TEARDOWN_TIMEOUT, transport.disconnect())
        .await
        .map_err(|_| ConsoleError::Timeout(TEARDOWN_TIMEOUT))?
}

async fn recv_host(rx: &mut Option<broadcast::Receiver<HostEvent>>) -> HostEvent {
    loop {
        let Some(receiver) = rx.as_mut() else {
            return std::future::pending().await;
        };
        match receiver.recv().await {
            Ok(event) => return event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("dropped {skipped} host notifications");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("host notifications closed");
                *rx = None;
            }
        }
    }
}

async fn tick(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use crate::host::HeadlessHost;
    use crate::transport::LoopbackProbe;
    use crate::transport::loopback::LoopbackBehaviour;

    fn params() -> ConnectParams {
        ConnectParams {
            url: "wss://console.test/vm-1/vnc".into(),
            token: "t".into(),
            width: 800,
            height: 600,
            dpi: 96,
        }
    }

    fn supervisor(probe: &LoopbackProbe, host: &HeadlessHost) -> ReconnectSupervisor {
        ReconnectSupervisor::new(probe.factory(), Arc::new(host.clone()))
    }

    #[tokio::test]
    async fn connect_registers_and_disconnect_releases() {
        let probe = LoopbackProbe::new();
        let host = HeadlessHost::with_viewport(800.0, 600.0);
        let mut sup = supervisor(&probe, &host);
        let state = StateCell::new();

        sup.connect(&state, &params()).await.unwrap();
        sup.start_resize_poll(Duration::from_millis(50));
        assert_eq!(state.phase(), ConnectionPhase::Connecting);
        assert_eq!(sup.pending_timers(), 1);
        assert_eq!(sup.registered_listeners(), 2);
        assert_eq!(host.listener_count(), 1);
        assert_eq!(probe.live_handlers(), 1);

        sup.disconnect(&state).await.unwrap();
        assert_eq!(state.phase(), ConnectionPhase::Disconnected);
        assert_eq!(sup.pending_timers(), 0);
        assert_eq!(sup.registered_listeners(), 0);
        assert_eq!(host.listener_count(), 0);
        assert_eq!(probe.live_handlers(), 0);
        assert_eq!(probe.disconnects(), 1);
    }

    #[tokio::test]
    async fn shutdown_closes_transport_without_touching_state() {
        let probe = LoopbackProbe::new();
        let host = HeadlessHost::with_viewport(800.0, 600.0);
        let mut sup = supervisor(&probe, &host);
        let state = StateCell::new();

        sup.connect(&state, &params()).await.unwrap();
        state.set(ConnectionPhase::TunnelError, Some(StatusCode::UPSTREAM_ERROR));
        sup.start_resize_poll(Duration::from_millis(50));

        sup.shutdown().await.unwrap();
        assert_eq!(probe.disconnects(), 1);
        assert_eq!(state.phase(), ConnectionPhase::TunnelError);
        assert_eq!(sup.pending_timers(), 0);
        assert_eq!(host.listener_count(), 0);
        assert_eq!(probe.live_handlers(), 0);

        // Nothing left to close.
        sup.shutdown().await.unwrap();
        assert_eq!(probe.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_teardown_times_out_and_still_releases() {
        let probe = LoopbackProbe::with_behaviour(LoopbackBehaviour {
            stall_disconnect: true,
            ..Default::default()
        });
        let host = HeadlessHost::with_viewport(800.0, 600.0);
        let mut sup = supervisor(&probe, &host);
        let state = StateCell::new();
        sup.connect(&state, &params()).await.unwrap();

        let err = sup.disconnect(&state).await.unwrap_err();
        assert!(matches!(err, ConsoleError::Timeout(d) if d == TEARDOWN_TIMEOUT));
        assert_eq!(state.phase(), ConnectionPhase::Disconnected);
        assert!(!sup.is_linked());
        assert_eq!(host.listener_count(), 0);
        assert_eq!(probe.live_handlers(), 0);
    }

    #[tokio::test]
    async fn failed_connect_leaves_nothing_registered() {
        let probe = LoopbackProbe::with_behaviour(LoopbackBehaviour {
            fail_connect: true,
            ..Default::default()
        });
        let host = HeadlessHost::with_viewport(800.0, 600.0);
        let mut sup = supervisor(&probe, &host);
        let state = StateCell::new();

        assert!(sup.connect(&state, &params()).await.is_err());
        assert_eq!(state.phase(), ConnectionPhase::TunnelError);
        assert_eq!(state.get().status_code(), StatusCode::SERVER_ERROR);
        assert_eq!(host.listener_count(), 0);
        assert!(!sup.is_linked());
    }

    #[tokio::test]
    async fn sticky_error_refuses_connect_until_reconnect() {
        let probe = LoopbackProbe::new();
        let host = HeadlessHost::with_viewport(800.0, 600.0);
        let mut sup = supervisor(&probe, &host);
        let state = StateCell::new();
        state.set(ConnectionPhase::ClientError, Some(StatusCode::CLIENT_FORBIDDEN));

        let err = sup.connect(&state, &params()).await.err().unwrap();
        assert!(matches!(err, ConsoleError::SessionFailed(code) if code == StatusCode::CLIENT_FORBIDDEN));
        assert_eq!(probe.connects(), 0);

        sup.reconnect(&state, &params()).await.unwrap();
        assert_eq!(state.phase(), ConnectionPhase::Connecting);
        assert_eq!(probe.connects(), 1);
    }

    #[tokio::test]
    async fn reconnect_does_not_leak_listeners() {
        let probe = LoopbackProbe::new();
        let host = HeadlessHost::with_viewport(800.0, 600.0);
        let mut sup = supervisor(&probe, &host);
        let state = StateCell::new();

        sup.connect(&state, &params()).await.unwrap();
        for _ in 0..3 {
            sup.reconnect(&state, &params()).await.unwrap();
            assert_eq!(host.listener_count(), 1);
            assert_eq!(probe.live_handlers(), 1);
        }
        assert_eq!(probe.connects(), 4);
    }

    #[tokio::test]
    async fn next_event_yields_transport_then_host_events() {
        let probe = LoopbackProbe::new();
        let host = HeadlessHost::with_viewport(800.0, 600.0);
        let mut sup = supervisor(&probe, &host);
        let state = StateCell::new();
        sup.connect(&state, &params()).await.unwrap();

        for _ in 0..3 {
            assert!(matches!(sup.next_event().await, LinkEvent::Transport(Some(_))));
        }
        host.emit(HostEvent::Copy);
        assert!(matches!(sup.next_event().await, LinkEvent::Host(HostEvent::Copy)));
    }

    #[tokio::test(start_paused = true)]
    async fn resize_poll_ticks() {
        let probe = LoopbackProbe::with_behaviour(LoopbackBehaviour {
            auto_handshake: false,
            ..Default::default()
        });
        let host = HeadlessHost::with_viewport(800.0, 600.0);
        let mut sup = supervisor(&probe, &host);
        let state = StateCell::new();
        sup.connect(&state, &params()).await.unwrap();

        sup.start_resize_poll(Duration::from_millis(50));
        assert!(matches!(sup.next_event().await, LinkEvent::ResizeTick));
        assert!(matches!(sup.next_event().await, LinkEvent::ResizeTick));
    }

    #[tokio::test]
    async fn tasks_are_aborted_on_release() {
        let probe = LoopbackProbe::new();
        let host = HeadlessHost::with_viewport(800.0, 600.0);
        let mut sup = supervisor(&probe, &host);
        let state = StateCell::new();
        sup.connect(&state, &params()).await.unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        assert!(sup.spawn(async move {
            std::future::pending::<()>().await;
            drop(tx);
        }));
        assert_eq!(sup.running_tasks(), 1);

        sup.release();
        // The task was aborted, so its sender is gone.
        assert!(rx.await.is_err());
        assert!(!sup.spawn(async {}));
    }
}
