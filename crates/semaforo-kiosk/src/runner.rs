//! Wiring used by the kiosk binary.
//!
//! The supervisor lives on its own task and is driven through
//! [`SupervisorCommand`]s; the decision flow runs on the caller's task and
//! consumes device events and operator input.

use semaforo_hardware::mock::MockBackend;
use semaforo_hardware::{AnyBackend, ConnectionSupervisor, SerialBackend};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::BackendKind;

/// Operator input on the headless console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KioskCommand {
    /// Request a decision as if the button were pressed (`p`).
    Trigger,

    /// Search for the controller again (`c`).
    Connect,

    /// Shut down (`q`).
    Quit,
}

impl KioskCommand {
    /// Parse one console line; case and surrounding whitespace are ignored.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "p" => Some(Self::Trigger),
            "c" => Some(Self::Connect),
            "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Requests for the supervisor task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorCommand {
    Connect,
    Shutdown,
}

/// Build the configured port backend.
pub fn build_backend(kind: BackendKind) -> AnyBackend {
    match kind {
        BackendKind::Serial => AnyBackend::Serial(SerialBackend::new()),
        BackendKind::Mock => {
            let (backend, _handle) = MockBackend::new();
            AnyBackend::Mock(backend)
        }
    }
}

/// Run automatic startup, then serve manual requests until told to shut
/// down or every command sender is dropped.
///
/// Requests arriving during startup are served once startup settles.
pub async fn supervise(
    mut supervisor: ConnectionSupervisor,
    mut commands: mpsc::Receiver<SupervisorCommand>,
) -> ConnectionSupervisor {
    let state = supervisor.run_startup().await;
    info!("Startup finished: {}", state);

    while let Some(command) = commands.recv().await {
        debug!(?command, "Supervisor command");
        match command {
            SupervisorCommand::Connect => {
                supervisor.connect_manual().await;
            }
            SupervisorCommand::Shutdown => break,
        }
    }

    supervisor.shutdown().await;
    supervisor
}
