//! Connection supervisor.
//!
//! The supervisor decides which [`Link`] the kiosk talks through. It drives
//! scan → probe → link worker, falls back to a simulated link when no
//! controller answers, and owns the retry policy.
//!
//! ```text
//!                 ┌────────────── manual connect ───────────────┐
//!                 ▼                                             │
//! Disconnected ─► Searching(n) ──► Connected(endpoint) ─────────┤
//!                 │   │   └──────► SimulatedMode ───────────────┤
//!                 │   └ no ports, automatic, n < max ─► Searching(n+1)
//!                 └ no ports, automatic, n = max ─► AwaitingManual ┘
//! ```
//!
//! Every search starts by stopping and joining the previous link worker, so
//! at most one endpoint is ever held open. Device events from whichever
//! worker is current arrive on the single receiver returned by
//! [`ConnectionSupervisor::new`].
//!
//! # Examples
//!
//! ```no_run
//! use semaforo_hardware::backend::{AnyBackend, SerialBackend};
//! use semaforo_hardware::supervisor::{ConnectionSupervisor, SupervisorConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = AnyBackend::Serial(SerialBackend::new());
//!     let (mut supervisor, mut events) =
//!         ConnectionSupervisor::new(backend, SupervisorConfig::strict());
//!
//!     let state = supervisor.run_startup().await;
//!     println!("{}", state.label());
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//! }
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use semaforo_core::constants::{
    EVENT_CHANNEL_CAPACITY, MAX_STARTUP_ATTEMPTS, MAX_TRANSITION_HISTORY, RETRY_DELAY_MS,
    STARTUP_DELAY_MS,
};
use semaforo_core::{ConnectionState, DeviceEvent, Endpoint};
use tokio::sync::{mpsc, watch};
use tokio::task;
use tracing::{debug, error, info, warn};

use crate::backend::AnyBackend;
use crate::link::{FallbackLink, Link};
use crate::prober::{ProbeConfig, Prober, ValidatedEndpoint};
use crate::traits::PortBackend;
use crate::worker::{LinkWorker, WorkerConfig};

/// Supervisor configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub probe: ProbeConfig,
    pub worker: WorkerConfig,

    /// Wait before the first automatic search.
    pub startup_delay: Duration,

    /// Wait between automatic searches that found no endpoints.
    pub retry_delay: Duration,

    /// Automatic searches before settling in `AwaitingManual`.
    pub max_startup_attempts: u32,

    /// Capacity of the device event channel.
    pub event_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::strict()
    }
}

impl SupervisorConfig {
    /// Handshake probing with bounded automatic retries.
    pub fn strict() -> Self {
        Self {
            probe: ProbeConfig::handshake(),
            worker: WorkerConfig::default(),
            startup_delay: Duration::from_millis(STARTUP_DELAY_MS),
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
            max_startup_attempts: MAX_STARTUP_ATTEMPTS,
            event_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }

    /// Passive probing with a single automatic search.
    pub fn passive() -> Self {
        Self {
            probe: ProbeConfig::passive(),
            max_startup_attempts: 1,
            ..Self::strict()
        }
    }
}

/// What triggered a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectMode {
    /// The operator asked to connect; an empty scan means simulate.
    Manual,

    /// Startup search; an empty scan means try again later.
    Automatic,
}

/// Record of a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub at: DateTime<Utc>,
}

impl StateTransition {
    pub fn new(from: ConnectionState, to: ConnectionState) -> Self {
        Self {
            from,
            to,
            at: Utc::now(),
        }
    }
}

/// Result of one search cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SearchOutcome {
    Connected(Endpoint),
    Simulated,
    NoCandidates,
}

/// Owner of the active link and of the connection state.
pub struct ConnectionSupervisor {
    backend: Arc<AnyBackend>,
    config: SupervisorConfig,
    events: mpsc::Sender<DeviceEvent>,
    worker: Option<LinkWorker>,
    state_tx: watch::Sender<ConnectionState>,
    link_tx: watch::Sender<Option<Link>>,
    history: VecDeque<StateTransition>,
}

impl ConnectionSupervisor {
    /// Create a supervisor in `Disconnected` and the receiver for device
    /// events from every link it will start.
    pub fn new(
        backend: AnyBackend,
        config: SupervisorConfig,
    ) -> (Self, mpsc::Receiver<DeviceEvent>) {
        let (events, event_rx) = mpsc::channel(config.event_capacity.max(1));
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (link_tx, _) = watch::channel(None);

        let supervisor = Self {
            backend: Arc::new(backend),
            config,
            events,
            worker: None,
            state_tx,
            link_tx,
            history: VecDeque::with_capacity(MAX_TRANSITION_HISTORY),
        };

        (supervisor, event_rx)
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    /// Watch connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// The link commands should currently go through, if any.
    pub fn link(&self) -> Option<Link> {
        self.link_tx.borrow().clone()
    }

    /// Watch the current link.
    pub fn links(&self) -> watch::Receiver<Option<Link>> {
        self.link_tx.subscribe()
    }

    /// Recent state transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Automatic startup: wait the startup delay, then search until an
    /// endpoint is found, the fallback link is chosen, or attempts run out.
    pub async fn run_startup(&mut self) -> ConnectionState {
        if !self.config.startup_delay.is_zero() {
            tokio::time::sleep(self.config.startup_delay).await;
        }

        let attempts = self.config.max_startup_attempts.max(1);
        for attempt in 1..=attempts {
            match self.search(ConnectMode::Automatic, attempt).await {
                SearchOutcome::NoCandidates if attempt < attempts => {
                    info!(
                        attempt,
                        retry_in_ms = self.config.retry_delay.as_millis() as u64,
                        "No endpoints found, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                SearchOutcome::NoCandidates => {}
                SearchOutcome::Connected(endpoint) => {
                    info!(endpoint = %endpoint, attempt, "Startup connected");
                    return self.state();
                }
                SearchOutcome::Simulated => return self.state(),
            }
        }

        warn!(attempts, "No endpoints found, waiting for manual connect");
        self.set_state(ConnectionState::AwaitingManual { attempts });
        self.state()
    }

    /// Operator-requested search. Drops any current link first.
    pub async fn connect_manual(&mut self) -> ConnectionState {
        info!("Manual connect requested");
        self.search(ConnectMode::Manual, 1).await;
        self.state()
    }

    /// Stop the active link, if any, and return to `Disconnected`.
    pub async fn shutdown(&mut self) {
        self.release_link().await;
        self.set_state(ConnectionState::Disconnected);
    }

    async fn search(&mut self, mode: ConnectMode, attempt: u32) -> SearchOutcome {
        self.release_link().await;
        self.set_state(ConnectionState::Searching { attempt });

        let backend = self.backend.clone();
        let candidates = task::spawn_blocking(move || backend.list_endpoints())
            .await
            .unwrap_or_else(|e| {
                warn!("Endpoint scan task failed: {}", e);
                Vec::new()
            });

        debug!(?mode, attempt, candidates = candidates.len(), "Scan finished");

        if candidates.is_empty() {
            return match mode {
                ConnectMode::Manual => {
                    info!("No endpoints found, using simulated link");
                    self.enter_simulated();
                    SearchOutcome::Simulated
                }
                ConnectMode::Automatic => SearchOutcome::NoCandidates,
            };
        }

        let prober = Prober::new(self.backend.clone(), self.config.probe.clone());
        let validated = task::spawn_blocking(move || first_validated(&prober, &candidates))
            .await
            .unwrap_or_else(|e| {
                warn!("Probe task failed: {}", e);
                None
            });

        let Some(validated) = validated else {
            info!("No endpoint answered, using simulated link");
            self.enter_simulated();
            return SearchOutcome::Simulated;
        };

        let endpoint = validated.endpoint;
        match LinkWorker::spawn(
            endpoint.clone(),
            self.backend.clone(),
            self.config.worker,
            self.events.clone(),
        ) {
            Ok(worker) => {
                self.link_tx.send_replace(Some(Link::Active(worker.link())));
                self.worker = Some(worker);
                self.set_state(ConnectionState::Connected {
                    endpoint: endpoint.clone(),
                });
                SearchOutcome::Connected(endpoint)
            }
            Err(e) => {
                error!(endpoint = %endpoint, "Failed to start link worker: {}", e);
                self.enter_simulated();
                SearchOutcome::Simulated
            }
        }
    }

    fn enter_simulated(&mut self) {
        self.link_tx
            .send_replace(Some(Link::Fallback(FallbackLink::new())));
        self.set_state(ConnectionState::SimulatedMode);
    }

    /// Withdraw the current link and wait for its worker to exit.
    async fn release_link(&mut self) {
        self.link_tx.send_replace(None);

        let Some(worker) = self.worker.take() else {
            return;
        };
        let endpoint = worker.endpoint().clone();

        match task::spawn_blocking(move || worker.join()).await {
            Ok(Ok(())) => debug!(endpoint = %endpoint, "Link worker released"),
            Ok(Err(e)) => warn!(endpoint = %endpoint, "Link worker ended badly: {}", e),
            Err(e) => warn!(endpoint = %endpoint, "Join task failed: {}", e),
        }
    }

    fn set_state(&mut self, next: ConnectionState) {
        let current = self.state();
        if current == next {
            return;
        }

        debug_assert!(
            current.can_transition_to(&next),
            "invalid connection transition {current} -> {next}"
        );
        info!(from = %current, to = %next, "Connection state changed");

        self.history
            .push_back(StateTransition::new(current, next.clone()));
        if self.history.len() > MAX_TRANSITION_HISTORY {
            self.history.pop_front();
        }

        self.state_tx.send_replace(next);
    }
}

impl std::fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("state", &self.state())
            .field("worker", &self.worker)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Probe candidates in order and stop at the first that validates.
fn first_validated(prober: &Prober, candidates: &[Endpoint]) -> Option<ValidatedEndpoint> {
    candidates
        .iter()
        .find_map(|endpoint| match prober.probe(endpoint) {
            Ok(validated) => Some(validated),
            Err(e) => {
                info!(endpoint = %e.endpoint(), "Candidate rejected: {}", e);
                None
            }
        })
}
