//! Device link layer for the Semáforo kiosk.
//!
//! This crate finds the traffic-light controller on the host's serial ports,
//! keeps one link to it open, turns the lines it sends into
//! [`DeviceEvent`](semaforo_core::DeviceEvent)s and writes commands back.
//! When no controller can be found the kiosk keeps working through a
//! simulated link.
//!
//! # Components
//!
//! - [`traits`]: the [`PortBackend`] and [`SerialConnection`] seams.
//! - [`backend`]: the `serialport` backend and [`AnyBackend`] dispatch.
//! - [`prober`]: passive and handshake validation of candidate endpoints.
//! - [`worker`]: the [`LinkWorker`] read loop on its own thread.
//! - [`link`]: [`Link`], the command path (active or fallback).
//! - [`supervisor`]: the [`ConnectionSupervisor`] state machine and retry
//!   policy.
//! - [`mock`]: scripted endpoints for tests and development.
//!
//! # Threading
//!
//! Serial I/O blocks, so it never runs on async tasks directly. Each link
//! worker owns a dedicated OS thread and the supervisor runs scans, probes
//! and joins on Tokio's blocking pool. Events cross into async code only
//! through the bounded `mpsc` channel the supervisor hands out.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use semaforo_core::ConnectionState;
//! use semaforo_hardware::{AnyBackend, ConnectionSupervisor, SupervisorConfig};
//! use semaforo_hardware::mock::MockBackend;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (backend, _handle) = MockBackend::new();
//! let mut config = SupervisorConfig::strict();
//! config.startup_delay = Duration::ZERO;
//!
//! let (mut supervisor, _events) = ConnectionSupervisor::new(AnyBackend::Mock(backend), config);
//!
//! // Nothing plugged in: a manual connect falls back to simulation
//! let state = supervisor.connect_manual().await;
//! assert_eq!(state, ConnectionState::SimulatedMode);
//! assert!(supervisor.link().unwrap().send_command("SUCCESS_GREEN"));
//! # }
//! ```

pub mod backend;
pub mod error;
pub mod link;
pub mod mock;
pub mod prober;
pub mod supervisor;
pub mod traits;
pub mod worker;

// Re-export commonly used types for convenience
pub use backend::{AnyBackend, SerialBackend};
pub use error::{HardwareError, ProbeError, Result};
pub use link::{ActiveLink, FallbackLink, Link};
pub use prober::{ProbeConfig, ProbeStrategy, Prober, ValidatedEndpoint};
pub use supervisor::{ConnectMode, ConnectionSupervisor, StateTransition, SupervisorConfig};
pub use traits::{PortBackend, SerialConnection, SerialSettings};
pub use worker::{LinkWorker, WorkerConfig};
