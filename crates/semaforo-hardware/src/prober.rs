//! Handshake prober.
//!
//! Before a link worker takes ownership of an endpoint, the prober checks
//! that a compatible controller sits behind it. Two strategies exist:
//!
//! - [`ProbeStrategy::Passive`]: the endpoint opens, so it is accepted. Fast,
//!   low assurance; used by the small-screen kiosks.
//! - [`ProbeStrategy::Handshake`]: wait for the board's power-on reset, flush
//!   boot noise, then send wake newlines until the firmware answers with
//!   `SEMAFOROSONG_READY`.
//!
//! ```text
//! open ── settle 2s ── clear input ─┬─ "\n" ── wait 0.5s ── line has token? ── yes ──► validated
//!                                   │                                 │
//!                                   └──────────── no (x3) ◄───────────┘ ──► NoResponse
//! ```
//!
//! Either way the prober closes the endpoint before returning, so the worker
//! can reopen it as the only owner. Probing blocks the calling thread; the
//! supervisor runs it on the blocking pool.

use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use semaforo_core::Endpoint;
use semaforo_core::constants::{
    HANDSHAKE_ROUND_DELAY_MS, HANDSHAKE_ROUNDS, HANDSHAKE_SETTLE_MS, LINE_TERMINATOR, READY_TOKEN,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::backend::AnyBackend;
use crate::error::ProbeError;
use crate::traits::{PortBackend, SerialConnection, SerialSettings};

/// How a candidate endpoint is validated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStrategy {
    /// Accept any endpoint that opens.
    Passive,

    /// Require the readiness token.
    #[default]
    Handshake,
}

/// Prober configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub strategy: ProbeStrategy,

    /// Settings used to open candidates.
    pub serial: SerialSettings,

    /// Wait after opening, before clearing input.
    pub settle_delay: Duration,

    /// Wait after each wake newline.
    pub round_delay: Duration,

    /// Wake rounds before giving up.
    pub rounds: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            strategy: ProbeStrategy::default(),
            serial: SerialSettings::default(),
            settle_delay: Duration::from_millis(HANDSHAKE_SETTLE_MS),
            round_delay: Duration::from_millis(HANDSHAKE_ROUND_DELAY_MS),
            rounds: HANDSHAKE_ROUNDS,
        }
    }
}

impl ProbeConfig {
    pub fn passive() -> Self {
        Self {
            strategy: ProbeStrategy::Passive,
            ..Self::default()
        }
    }

    pub fn handshake() -> Self {
        Self::default()
    }
}

/// An endpoint that passed probing and has been closed again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedEndpoint {
    pub endpoint: Endpoint,
    pub strategy: ProbeStrategy,

    /// Wake round that produced the token; `None` for passive probes.
    pub answered_round: Option<u32>,
}

/// Validates candidate endpoints.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use semaforo_core::Endpoint;
/// use semaforo_hardware::backend::AnyBackend;
/// use semaforo_hardware::mock::{MockBackend, MockPort};
/// use semaforo_hardware::prober::{ProbeConfig, Prober};
///
/// let (backend, handle) = MockBackend::new();
/// handle.add_port(MockPort::new("COM5").ready_on_round(1));
///
/// let config = ProbeConfig {
///     settle_delay: Duration::ZERO,
///     round_delay: Duration::ZERO,
///     ..ProbeConfig::handshake()
/// };
/// let prober = Prober::new(Arc::new(AnyBackend::Mock(backend)), config);
///
/// let validated = prober.probe(&Endpoint::new("COM5").unwrap()).unwrap();
/// assert_eq!(validated.answered_round, Some(1));
/// assert_eq!(handle.open_handles("COM5"), 0);
/// ```
#[derive(Debug, Clone)]
pub struct Prober {
    backend: Arc<AnyBackend>,
    config: ProbeConfig,
}

impl Prober {
    pub fn new(backend: Arc<AnyBackend>, config: ProbeConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Probe one candidate with the configured strategy.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::IoFailure`] if the endpoint cannot be opened or
    /// fails mid-handshake, and [`ProbeError::NoResponse`] if the handshake
    /// runs out of rounds.
    pub fn probe(&self, endpoint: &Endpoint) -> Result<ValidatedEndpoint, ProbeError> {
        debug!(endpoint = %endpoint, strategy = ?self.config.strategy, "Probing endpoint");

        let connection = self
            .backend
            .open(endpoint, &self.config.serial)
            .map_err(|e| ProbeError::io_failure(endpoint, e))?;

        let validated = match self.config.strategy {
            ProbeStrategy::Passive => {
                drop(connection);
                ValidatedEndpoint {
                    endpoint: endpoint.clone(),
                    strategy: ProbeStrategy::Passive,
                    answered_round: None,
                }
            }
            ProbeStrategy::Handshake => {
                let round = self.handshake(endpoint, connection)?;
                ValidatedEndpoint {
                    endpoint: endpoint.clone(),
                    strategy: ProbeStrategy::Handshake,
                    answered_round: Some(round),
                }
            }
        };

        info!(endpoint = %endpoint, "Endpoint validated");
        Ok(validated)
    }

    /// Run the wake/answer exchange. Consumes (and so closes) the connection.
    fn handshake(
        &self,
        endpoint: &Endpoint,
        mut connection: Box<dyn SerialConnection>,
    ) -> Result<u32, ProbeError> {
        let io_failure = |e: std::io::Error| ProbeError::io_failure(endpoint, e);

        pause(self.config.settle_delay);
        connection.clear_input().map_err(io_failure)?;

        for round in 1..=self.config.rounds {
            connection
                .write_all(&[LINE_TERMINATOR])
                .and_then(|()| connection.flush())
                .map_err(io_failure)?;

            pause(self.config.round_delay);

            if connection.bytes_to_read().map_err(io_failure)? > 0 {
                let line = connection.read_line().map_err(io_failure)?;
                trace!(endpoint = %endpoint, round, line = %line, "Handshake reply");

                if line.contains(READY_TOKEN) {
                    return Ok(round);
                }
            }
        }

        debug!(
            endpoint = %endpoint,
            rounds = self.config.rounds,
            "No readiness token"
        );
        Err(ProbeError::NoResponse {
            endpoint: endpoint.clone(),
            rounds: self.config.rounds,
        })
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}
