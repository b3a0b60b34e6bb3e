//! Integration tests: full session lifecycle, clipboard sync, display
//! scaling and error recovery, driven through a `SessionHandle` against
//! the loopback transport and a headless host.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use vmconsole_core::transport::loopback::{ClipboardCall, LoopbackBehaviour};
use vmconsole_core::{
    ClipboardData, ClipboardPayload, ConnectionKind, ConnectionPhase, ConsoleTarget, FocusTarget, HeadlessHost,
    HostEvent, InputForwarder, KeyEvent, LoopbackProbe, PointerButtons, PointerEvent, SessionConfig,
    SessionHandle, SessionManager, StatusCode, StreamChunk, TransportEvent,
};

// ── Helpers ──────────────────────────────────────────────────────

struct Mounted {
    probe: LoopbackProbe,
    host: HeadlessHost,
    handle: SessionHandle,
    task: JoinHandle<SessionManager>,
}

fn mount(kind: ConnectionKind, behaviour: LoopbackBehaviour) -> Mounted {
    let probe = LoopbackProbe::with_behaviour(behaviour);
    let host = HeadlessHost::with_viewport(800.0, 600.0);
    let target = ConsoleTarget {
        base_url: "wss://console.test/tunnel".into(),
        token: "token".into(),
        vm_id: "vm-7".into(),
        kind,
    };
    let (mut manager, handle) =
        SessionManager::new(target, SessionConfig::default(), Arc::new(host.clone()), probe.factory());
    let task = tokio::spawn(async move {
        manager.run().await;
        manager
    });
    Mounted {
        probe,
        host,
        handle,
        task,
    }
}

async fn mount_connected(kind: ConnectionKind) -> Mounted {
    let m = mount(kind, LoopbackBehaviour::default());
    within(m.handle.wait_for_phase(ConnectionPhase::Connected))
        .await
        .expect("session did not connect");
    // The resync that follows every connect pushes the (empty) host
    // clipboard once.
    eventually(|| m.probe.clipboard_calls().len() == 2).await;
    m
}

async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timeout")
}

async fn eventually(mut cond: impl FnMut() -> bool) {
    within(async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
}

/// Give the session task time to process anything already queued.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ── Lifecycle ────────────────────────────────────────────────────

#[tokio::test]
async fn test_lifecycle_and_teardown() {
    let m = mount_connected(ConnectionKind::Vnc).await;

    let params = m.probe.last_params().unwrap();
    assert_eq!(params.url, "wss://console.test/tunnel/vm-7/vnc");
    assert_eq!((params.width, params.height), (800, 600));
    assert_eq!(m.handle.id().as_str(), "vm-7-vnc");
    assert_eq!(m.probe.live_handlers(), 1);
    assert_eq!(m.host.listener_count(), 1);

    m.handle.disconnect().await.unwrap();
    let manager = within(m.task).await.unwrap();

    assert_eq!(manager.state().phase(), ConnectionPhase::Disconnected);
    assert_eq!(manager.pending_timers(), 0);
    assert_eq!(manager.registered_listeners(), 0);
    assert_eq!(m.probe.live_handlers(), 0);
    assert_eq!(m.host.listener_count(), 0);
    assert_eq!(m.probe.disconnects(), 1);
}

#[tokio::test]
async fn test_dropping_handles_unmounts() {
    let m = mount_connected(ConnectionKind::Rdp).await;
    let extra = m.handle.clone();
    drop(m.handle);
    settle().await;
    assert!(!m.task.is_finished());

    drop(extra);
    let manager = within(m.task).await.unwrap();
    assert_eq!(manager.pending_timers(), 0);
    assert_eq!(m.probe.live_handlers(), 0);
    assert_eq!(m.host.listener_count(), 0);
}

// ── Errors ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_tunnel_error_is_sticky_until_reconnect() {
    let m = mount_connected(ConnectionKind::Vnc).await;

    m.probe
        .emit(TransportEvent::TunnelError(StatusCode::UPSTREAM_TIMEOUT))
        .unwrap();
    let state = within(m.handle.wait_for_phase(ConnectionPhase::TunnelError))
        .await
        .unwrap();
    assert_eq!(state.status_code(), StatusCode::UPSTREAM_TIMEOUT);
    eventually(|| m.probe.live_handlers() == 0 && m.host.listener_count() == 0).await;

    // Nothing reaches the torn-down session.
    assert!(m.probe.emit(TransportEvent::Connected).is_err());
    assert_eq!(m.handle.state().phase(), ConnectionPhase::TunnelError);

    m.handle.reconnect().await.unwrap();
    let state = within(m.handle.wait_for_phase(ConnectionPhase::Connected))
        .await
        .unwrap();
    assert_eq!(state.status_code(), StatusCode::SUCCESS);
    assert_eq!(m.probe.connects(), 2);
    assert_eq!(m.probe.live_handlers(), 1);
    assert_eq!(m.host.listener_count(), 1);
}

#[tokio::test]
async fn test_failed_connect_then_reconnect() {
    let m = mount(
        ConnectionKind::Vnc,
        LoopbackBehaviour {
            fail_connect: true,
            ..Default::default()
        },
    );
    let state = within(m.handle.wait_for_phase(ConnectionPhase::TunnelError))
        .await
        .unwrap();
    assert_eq!(state.status_code(), StatusCode::SERVER_ERROR);
    assert_eq!(m.host.listener_count(), 0);

    m.probe.set_behaviour(LoopbackBehaviour::default());
    m.handle.reconnect().await.unwrap();
    within(m.handle.wait_for_phase(ConnectionPhase::Connected))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_client_error_flags_unauthorized() {
    let m = mount_connected(ConnectionKind::Vnc).await;
    m.probe
        .emit(TransportEvent::ClientError(StatusCode::CLIENT_FORBIDDEN))
        .unwrap();
    let state = within(m.handle.wait_for_phase(ConnectionPhase::ClientError))
        .await
        .unwrap();
    assert!(state.status_code().is_unauthorized());
    assert!(state.label().contains("error"));
}

#[tokio::test]
async fn test_tunnel_instability_is_a_passive_flag() {
    let m = mount_connected(ConnectionKind::Vnc).await;

    m.probe.emit(TransportEvent::TunnelUnstable(true)).unwrap();
    let state = within(m.handle.wait_for(|s| s.is_tunnel_unstable()))
        .await
        .unwrap();
    assert_eq!(state.phase(), ConnectionPhase::Connected);

    m.probe.emit(TransportEvent::TunnelUnstable(false)).unwrap();
    within(m.handle.wait_for(|s| !s.is_tunnel_unstable()))
        .await
        .unwrap();
    assert_eq!(m.handle.state().phase(), ConnectionPhase::Connected);
}

#[tokio::test]
async fn test_repeated_connected_changes_nothing() {
    let m = mount_connected(ConnectionKind::Vnc).await;
    let uploads = m.probe.clipboard_calls().len();

    m.probe.emit(TransportEvent::Connected).unwrap();
    settle().await;
    assert_eq!(m.probe.clipboard_calls().len(), uploads);
    assert_eq!(m.handle.state().phase(), ConnectionPhase::Connected);
}

#[tokio::test]
async fn test_fault_still_closes_transport() {
    let m = mount_connected(ConnectionKind::Vnc).await;
    m.probe
        .emit(TransportEvent::ClientError(StatusCode::SESSION_CLOSED))
        .unwrap();
    within(m.handle.wait_for_phase(ConnectionPhase::ClientError))
        .await
        .unwrap();
    eventually(|| m.probe.disconnects() == 1).await;
    assert_eq!(m.handle.state().phase(), ConnectionPhase::ClientError);
}

// ── Clipboard ────────────────────────────────────────────────────

#[tokio::test]
async fn test_focus_resync_only_for_window() {
    let m = mount_connected(ConnectionKind::Vnc).await;
    assert_eq!(m.host.read_count(), 1);
    m.host.set_clipboard(ClipboardData::text("local", "from host"));

    m.host.emit(HostEvent::Focus(FocusTarget::Descendant));
    settle().await;
    assert_eq!(m.host.read_count(), 1);

    m.host.emit(HostEvent::Focus(FocusTarget::Window));
    eventually(|| m.probe.clipboard_calls().len() == 4).await;
    assert_eq!(
        m.probe.clipboard_calls()[2..],
        [ClipboardCall::Text("from host".into()), ClipboardCall::End]
    );
    assert_eq!(m.host.read_count(), 2);
}

#[tokio::test]
async fn test_copy_and_cut_resync_changed_values_only() {
    let m = mount_connected(ConnectionKind::Vnc).await;

    m.host.set_clipboard(ClipboardData::text("local", "one"));
    m.host.emit(HostEvent::Copy);
    eventually(|| m.probe.clipboard_calls().len() == 4).await;

    // Same value again: read, but not re-uploaded.
    m.host.emit(HostEvent::Cut);
    eventually(|| m.host.read_count() == 3).await;
    settle().await;
    assert_eq!(m.probe.clipboard_calls().len(), 4);
}

#[tokio::test]
async fn test_remote_clipboard_reaches_host() {
    let m = mount_connected(ConnectionKind::Vnc).await;

    m.probe
        .push_clipboard(
            "text/plain",
            vec![
                StreamChunk::Text("hel".into()),
                StreamChunk::Text("lo".into()),
                StreamChunk::End,
            ],
        )
        .unwrap();
    eventually(|| m.host.written() == ["hello".to_string()]).await;

    let latest = m.handle.clipboard().unwrap();
    assert_eq!(latest.source, "vm-7-vnc");
    assert_eq!(latest.payload, ClipboardPayload::Text("hello".into()));
}

#[tokio::test]
async fn test_remote_binary_clipboard_is_cached_not_written() {
    let m = mount_connected(ConnectionKind::Vnc).await;

    m.probe
        .push_clipboard(
            "image/png",
            vec![
                StreamChunk::Text("ab".into()),
                StreamChunk::Text("cd".into()),
                StreamChunk::Text("ef".into()),
                StreamChunk::End,
            ],
        )
        .unwrap();
    eventually(|| m.handle.clipboard().is_some_and(|c| c.mimetype == "image/png")).await;

    assert_eq!(
        m.handle.clipboard().unwrap().payload,
        ClipboardPayload::Blob(bytes::Bytes::from_static(b"abcdef"))
    );
    assert!(m.host.written().is_empty());
}

#[tokio::test]
async fn test_echoed_copy_does_not_loop() {
    let m = mount(
        ConnectionKind::Vnc,
        LoopbackBehaviour {
            echo_clipboard: true,
            ..Default::default()
        },
    );
    within(m.handle.wait_for_phase(ConnectionPhase::Connected))
        .await
        .unwrap();
    eventually(|| m.host.written().len() == 1).await;

    m.host.set_clipboard(ClipboardData::text("local", "ping"));
    m.host.emit(HostEvent::Copy);
    eventually(|| m.host.written().last().is_some_and(|t| t == "ping")).await;
    let uploads = m.probe.clipboard_calls().len();

    m.host.emit(HostEvent::Copy);
    settle().await;
    assert_eq!(m.probe.clipboard_calls().len(), uploads);
}

// ── Display ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_resize_reaches_remote_once() {
    let m = mount_connected(ConnectionKind::Vnc).await;

    m.host.resize(1024.0, 700.0);
    eventually(|| m.probe.resize_requests() == [(1024, 700)]).await;

    // Poll ticks keep running but nothing new is sent.
    settle().await;
    assert_eq!(m.probe.resize_requests(), [(1024, 700)]);
}

#[tokio::test]
async fn test_refused_resize_is_retried() {
    let m = mount_connected(ConnectionKind::Vnc).await;
    m.probe.set_behaviour(LoopbackBehaviour {
        accept_resize: false,
        ..Default::default()
    });

    m.host.resize(1024.0, 700.0);
    eventually(|| m.probe.resize_requests() == [(1024, 700)]).await;

    // The remote starts honouring requests; the pending size is sent again.
    m.probe.set_behaviour(LoopbackBehaviour::default());
    eventually(|| m.probe.resize_requests().len() >= 2).await;
    assert!(m.probe.resize_requests().iter().all(|&size| size == (1024, 700)));

    // Once applied, the poll goes quiet.
    settle().await;
    let sent = m.probe.resize_requests().len();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(m.probe.resize_requests().len(), sent);
}

#[tokio::test]
async fn test_fit_scale_follows_viewport() {
    let m = mount_connected(ConnectionKind::Vnc).await;
    m.probe.set_behaviour(LoopbackBehaviour {
        accept_resize: false,
        ..Default::default()
    });

    m.host.resize(400.0, 300.0);
    eventually(|| m.probe.applied_scales().last() == Some(&0.5)).await;
}

#[tokio::test]
async fn test_terminal_session_resizes_without_scaling() {
    let m = mount_connected(ConnectionKind::Ssh).await;
    m.probe.set_behaviour(LoopbackBehaviour {
        accept_resize: false,
        ..Default::default()
    });

    m.host.resize(400.0, 300.0);
    eventually(|| m.probe.resize_requests() == [(400, 300)]).await;
    settle().await;
    assert!(m.probe.applied_scales().is_empty());
}

#[tokio::test]
async fn test_fullscreen_requests_screen_size() {
    let m = mount_connected(ConnectionKind::Vnc).await;

    m.handle.toggle_fullscreen().await.unwrap();
    eventually(|| m.probe.resize_requests() == [(1920, 1080)]).await;
    settle().await;
    assert_eq!(m.probe.resize_requests(), [(1920, 1080)]);
}

#[tokio::test]
async fn test_manual_zoom_and_back_to_fit() {
    let m = mount_connected(ConnectionKind::Vnc).await;

    m.handle.set_scale(10.0).await.unwrap();
    eventually(|| m.probe.applied_scales().last() == Some(&3.0)).await;

    m.handle.auto_fit().await.unwrap();
    eventually(|| m.probe.applied_scales().last() == Some(&1.0)).await;
}

// ── Input and snapshots ──────────────────────────────────────────

#[tokio::test]
async fn test_ctrl_alt_del_and_input() {
    let m = mount_connected(ConnectionKind::Vnc).await;

    m.handle.send_ctrl_alt_del().await.unwrap();
    m.handle.key(KeyEvent::press(0x61)).await.unwrap();
    m.handle.pointer(100.0, 50.0, PointerButtons::LEFT).await.unwrap();
    eventually(|| m.probe.keys().len() == 7 && m.probe.pointers().len() == 1).await;

    assert_eq!(m.probe.keys()[..6], InputForwarder::ctrl_alt_del_sequence());
    assert_eq!(m.probe.keys()[6], KeyEvent::press(0x61));
    assert_eq!(
        m.probe.pointers(),
        [PointerEvent {
            x: 100,
            y: 50,
            buttons: PointerButtons::LEFT
        }]
    );
}

#[tokio::test]
async fn test_screenshot_forces_capture() {
    let m = mount_connected(ConnectionKind::Vnc).await;
    let first = m.handle.thumbnail().expect("thumbnail taken on connect");

    let shot = m.handle.screenshot().await.unwrap().unwrap();
    assert!(shot.timestamp >= first.timestamp);
    assert_eq!((shot.snapshot.width, shot.snapshot.height), (320, 240));

    m.probe
        .emit(TransportEvent::TunnelError(StatusCode::SESSION_CLOSED))
        .unwrap();
    within(m.handle.wait_for_phase(ConnectionPhase::TunnelError))
        .await
        .unwrap();
    assert!(m.handle.screenshot().await.unwrap().is_none());
}
