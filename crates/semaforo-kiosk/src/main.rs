//! Headless Semáforo kiosk.
//!
//! Reads one command per line from stdin: `p` requests a decision, `c`
//! searches for the controller again, `q` quits. Screen updates are written
//! to the log.

use anyhow::{Context, Result};
use semaforo_hardware::ConnectionSupervisor;
use semaforo_kiosk::display::forward_connection_state;
use semaforo_kiosk::runner::{build_backend, supervise};
use semaforo_kiosk::{DecisionFlow, KioskCommand, KioskConfig, LogSink, SupervisorCommand};
use semaforo_network::DecisionClient;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    // RUST_LOG=semaforo_hardware=debug,info
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = KioskConfig::load().context("failed to load configuration")?;
    info!(
        version = semaforo_kiosk::VERSION,
        profile = ?config.profile,
        backend = ?config.backend,
        "Starting Semáforo kiosk"
    );

    let client =
        DecisionClient::new(config.decision_config()).context("failed to build HTTP client")?;

    let (supervisor, mut events) = ConnectionSupervisor::new(
        build_backend(config.backend),
        config.supervisor_config(),
    );
    let flow = DecisionFlow::new(client, LogSink, supervisor.links());
    tokio::spawn(forward_connection_state(supervisor.subscribe_state(), LogSink));

    let (control, control_rx) = mpsc::channel(4);
    let supervisor_task = tokio::spawn(supervise(supervisor, control_rx));

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    flow.handle_event(event).await;
                }
                None => break,
            },
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match KioskCommand::parse(&line) {
                    Some(KioskCommand::Trigger) => {
                        flow.trigger().await;
                    }
                    Some(KioskCommand::Connect) => {
                        control
                            .send(SupervisorCommand::Connect)
                            .await
                            .context("supervisor task stopped")?;
                    }
                    Some(KioskCommand::Quit) => break,
                    None if line.trim().is_empty() => {}
                    None => warn!(input = %line.trim(), "Unknown command; use p, c or q"),
                },
                Ok(None) => {
                    info!("Console closed, running on device input only");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("Console read failed: {}", e);
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Shutting down");
    control.send(SupervisorCommand::Shutdown).await.ok();
    let supervisor = supervisor_task
        .await
        .context("supervisor task panicked")?;
    info!("Final state: {}", supervisor.state());

    Ok(())
}
