//! vmconsole: headless console session driver.
//!
//! ```text
//! vmconsole                      Mount the configured console
//! vmconsole --config <path>      Use custom config TOML
//! vmconsole --vm <id> --kind rdp Override the target
//! vmconsole --gen-config         Dump default config and exit
//! vmconsole --init               Write default config to --config and exit
//! ```
//!
//! Mounts one session against the loopback transport and a headless
//! host, then reads commands from stdin (see `commands.rs`).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vmconsole_core::clipboard::LOCAL_SOURCE;
use vmconsole_core::host::HostEnvironment;
use vmconsole_core::input::keysym;
use vmconsole_core::transport::loopback::LoopbackBehaviour;
use vmconsole_core::{
    ClipboardData, ClipboardPayload, ConnectionKind, ConsoleError, FocusTarget, HeadlessHost, HostEvent, KeyEvent,
    LoopbackProbe, PointerButtons, SessionHandle, SessionManager, StatusCode, StreamChunk, TransportEvent,
};

use vmconsole_cli::commands::{ConsoleCommand, parse_command};
use vmconsole_cli::config::CliConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vmconsole", about = "VM remote-console session driver")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "vmconsole.toml")]
    config: PathBuf,

    /// VM id (overrides config).
    #[arg(long)]
    vm: Option<String>,

    /// Connection kind: vnc, rdp or ssh (overrides config).
    #[arg(short, long)]
    kind: Option<ConnectionKind>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write the default configuration to the config path and exit.
    #[arg(long)]
    init: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&CliConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    if cli.init {
        CliConfig::write_default(&cli.config)?;
        println!("wrote {}", cli.config.display());
        return Ok(());
    }

    let mut config = CliConfig::load(&cli.config);
    if let Some(vm) = cli.vm {
        config.console.vm_id = vm;
    }
    if let Some(kind) = cli.kind {
        config.console.kind = kind;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("vmconsole v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Host and transport ───────────────────────────────────

    let host = HeadlessHost::new(config.viewport.metrics());
    let probe = LoopbackProbe::with_behaviour(LoopbackBehaviour {
        echo_clipboard: true,
        ..Default::default()
    });

    // ── 2. Mount the session ────────────────────────────────────

    let target = config.console.target();
    info!("mounting {} at {}", target.session_id(), target.url());
    let (mut manager, handle) =
        SessionManager::new(target, config.session.clone(), Arc::new(host.clone()), probe.factory());
    let session = tokio::spawn(async move {
        manager.run().await;
        manager
    });

    let mut states = handle.subscribe_state();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let label = states.borrow_and_update().label();
            println!("[state] {label}");
        }
    });

    // ── 3. Command loop ─────────────────────────────────────────

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Ok(ConsoleCommand::Quit) => break,
            Ok(command) => {
                if let Err(e) = execute(command, &handle, &host, &probe).await {
                    warn!("command failed: {e}");
                }
            }
            Err(e) => println!("{e}"),
        }
    }

    // ── 4. Shutdown ─────────────────────────────────────────────

    info!("shutting down");
    handle.disconnect().await?;
    drop(handle);
    let manager = tokio::time::timeout(Duration::from_secs(5), session).await??;
    info!(
        "closed with {} timers and {} listeners left",
        manager.pending_timers(),
        manager.registered_listeners()
    );

    Ok(())
}

async fn execute(
    command: ConsoleCommand,
    handle: &SessionHandle,
    host: &HeadlessHost,
    probe: &LoopbackProbe,
) -> Result<(), ConsoleError> {
    match command {
        ConsoleCommand::Status => {
            let metrics = host.metrics();
            println!(
                "{} | viewport {}x{} | fullscreen {} | scales applied {:?}",
                handle.state().label(),
                metrics.viewport.width,
                metrics.viewport.height,
                metrics.fullscreen,
                probe.applied_scales().last()
            );
        }
        ConsoleCommand::Reconnect => handle.reconnect().await?,
        ConsoleCommand::Screenshot => match handle.screenshot().await? {
            Some(thumb) => println!(
                "thumbnail {}x{} ({} bytes)",
                thumb.snapshot.width,
                thumb.snapshot.height,
                thumb.snapshot.byte_len()
            ),
            None => println!("not connected"),
        },
        ConsoleCommand::Fullscreen => handle.toggle_fullscreen().await?,
        ConsoleCommand::CtrlAltDel => handle.send_ctrl_alt_del().await?,
        ConsoleCommand::Key(sym) => {
            handle.key(KeyEvent::press(sym)).await?;
            handle.key(KeyEvent::release(sym)).await?;
        }
        ConsoleCommand::Type(text) => {
            for ch in text.chars().filter(char::is_ascii) {
                let sym = if ch == '\n' { keysym::RETURN } else { u32::from(ch) };
                handle.key(KeyEvent::press(sym)).await?;
                handle.key(KeyEvent::release(sym)).await?;
            }
        }
        ConsoleCommand::Click(x, y) => {
            handle.pointer(x, y, PointerButtons::LEFT).await?;
            handle.pointer(x, y, PointerButtons::empty()).await?;
        }
        ConsoleCommand::Scale(Some(factor)) => handle.set_scale(factor).await?,
        ConsoleCommand::Scale(None) => handle.auto_fit().await?,
        ConsoleCommand::Resize(width, height) => host.resize(width, height),
        ConsoleCommand::Focus => {
            host.emit(HostEvent::Focus(FocusTarget::Window));
        }
        ConsoleCommand::Copy(text) => {
            host.set_clipboard(ClipboardData::text(LOCAL_SOURCE, &text));
            host.emit(HostEvent::Copy);
        }
        ConsoleCommand::RemoteCopy(text) => {
            probe.push_clipboard("text/plain", vec![StreamChunk::Text(text), StreamChunk::End])?;
        }
        ConsoleCommand::Clipboard => match handle.clipboard() {
            Some(data) => match data.payload {
                ClipboardPayload::Text(text) => println!("[{} {}] {text}", data.source, data.mimetype),
                ClipboardPayload::Blob(bytes) => {
                    println!("[{} {}] {} bytes", data.source, data.mimetype, bytes.len())
                }
            },
            None => println!("clipboard empty"),
        },
        ConsoleCommand::Fault(code) => probe.emit(TransportEvent::TunnelError(StatusCode(code)))?,
        ConsoleCommand::Unstable(flag) => probe.emit(TransportEvent::TunnelUnstable(flag))?,
        ConsoleCommand::Quit => {}
    }
    Ok(())
}
