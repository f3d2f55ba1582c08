//! idlewatch - session idle detection and keepalive coordination
//!
//! This is the main entry point for the idlewatch binary: a small host that
//! treats terminal input as session activity and renders monitor events.

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

use idlewatch::{
    config::Config,
    events::{EventBus, MonitorEvent},
    monitor::{Idle, Keepalive},
    utils::shutdown_signal,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("idlewatch={}", config.log_level()))
        .init();

    info!("starting idlewatch v0.1.0");

    let idle_options = config.idle_options()?;
    let keepalive_options = config.keepalive_options()?;
    info!(
        "configuration: idle={}s, timeout={}s, keepalive={}, interval={}s",
        idle_options.idle_secs(),
        idle_options.timeout_secs(),
        idle_options.keepalive_enabled(),
        keepalive_options.interval_secs(),
    );

    let bus = EventBus::default();
    let keepalive = Keepalive::new(keepalive_options, bus.clone())?;
    let idle = Idle::new(idle_options, Some(keepalive.clone()), bus.clone());

    // Render monitor events for the session owner
    let mut events = bus.subscribe();
    let json = config.json;
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if json {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(err) => error!("failed to serialize event: {err}"),
                }
            }
            match event {
                MonitorEvent::IdleStart => warn!("session went idle"),
                MonitorEvent::IdleWarn(remaining) => {
                    warn!("{remaining}s remaining until session timeout")
                }
                MonitorEvent::IdleTimeout => error!("session timed out"),
                MonitorEvent::IdleEnd => info!("activity resumed"),
                MonitorEvent::Keepalive => debug!("keepalive heartbeat"),
                MonitorEvent::KeepaliveResponse {
                    error: Some(err), ..
                } => warn!("keepalive ping failed: {err}"),
                MonitorEvent::KeepaliveResponse { status, .. } => {
                    debug!("keepalive ping completed: status={status:?}")
                }
            }
        }
    });

    idle.watch()?;

    // Bind terminal input as the activity signal when the advisory
    // interrupt-events list asks for it.
    let stdin_bound = idle
        .options()?
        .interrupt_event_names()
        .iter()
        .any(|name| name == "stdin");
    if stdin_bound {
        info!("watching session; terminal input counts as activity");
    } else {
        info!("watching session; no activity source bound");
    }

    tokio::select! {
        _ = forward_stdin_activity(idle.clone()), if stdin_bound => {}
        signal = shutdown_signal() => {
            if let Some(signal) = signal {
                info!("received signal: {signal}");
            }
        }
    }

    idle.unwatch()?;
    keepalive.stop()?;
    info!("idlewatch shutdown complete");
    Ok(())
}

/// Feed each line of terminal input into the monitor as an interrupt.
async fn forward_stdin_activity(idle: Idle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(_)) = lines.next_line().await {
        if let Err(err) = idle.interrupt() {
            error!("failed to register activity: {err}");
        }
    }
}
