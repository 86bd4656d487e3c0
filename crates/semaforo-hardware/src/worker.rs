//! Link worker.
//!
//! A [`LinkWorker`] owns one validated endpoint for as long as it is
//! connected. It runs on a dedicated OS thread because every serial call
//! blocks (reads wait up to the I/O timeout). The thread:
//!
//! 1. opens the endpoint (the prober has already closed its own handle),
//! 2. polls for buffered input, reads one line, classifies it into a
//!    [`DeviceEvent`] and posts it on the event channel,
//! 3. sleeps one idle interval and repeats until stop is requested.
//!
//! The event channel is the only path out of the worker thread. Commands go
//! the other way through an [`ActiveLink`] handle, which shares the open
//! endpoint with the read loop under a mutex.
//!
//! # Stop semantics
//!
//! [`LinkWorker::stop`] clears the running flag and closes the endpoint. Events
//! are only posted while holding the same lock `stop` takes, after re-checking
//! the flag, so once `stop` has returned nothing more reaches the channel. The
//! thread itself may linger for up to one blocking read before it notices;
//! [`LinkWorker::join`] waits for it.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use semaforo_core::constants::LINK_IDLE_INTERVAL_MS;
use semaforo_core::{DeviceEvent, Endpoint};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::backend::AnyBackend;
use crate::error::{HardwareError, Result};
use crate::link::{ActiveLink, LinkShared};
use crate::traits::{PortBackend, SerialSettings};

/// Link worker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Settings used to open the endpoint.
    pub serial: SerialSettings,

    /// Pause between polls of the input buffer.
    pub idle_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            serial: SerialSettings::default(),
            idle_interval: Duration::from_millis(LINK_IDLE_INTERVAL_MS),
        }
    }
}

/// Owner of one open endpoint and its read loop.
///
/// Dropping the worker requests stop but does not wait for the thread.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use semaforo_core::{DeviceEvent, Endpoint};
/// use semaforo_hardware::backend::AnyBackend;
/// use semaforo_hardware::mock::{MockBackend, MockPort};
/// use semaforo_hardware::worker::{LinkWorker, WorkerConfig};
/// use tokio::sync::mpsc;
///
/// let (backend, handle) = MockBackend::new();
/// handle.add_port(MockPort::new("COM5"));
///
/// let (tx, mut rx) = mpsc::channel(16);
/// let config = WorkerConfig {
///     idle_interval: Duration::from_millis(5),
///     ..WorkerConfig::default()
/// };
/// let worker = LinkWorker::spawn(
///     Endpoint::new("COM5").unwrap(),
///     Arc::new(AnyBackend::Mock(backend)),
///     config,
///     tx,
/// )
/// .unwrap();
///
/// handle.push_line("COM5", "BUTTON_PRESSED");
/// assert_eq!(rx.blocking_recv(), Some(DeviceEvent::ButtonPressed));
///
/// assert!(worker.send_command("SUCCESS_GREEN"));
/// worker.join().unwrap();
/// assert_eq!(handle.commands("COM5"), vec!["SUCCESS_GREEN"]);
/// ```
#[derive(Debug)]
pub struct LinkWorker {
    link: ActiveLink,
    shared: Arc<LinkShared>,
    thread: Option<JoinHandle<()>>,
}

impl LinkWorker {
    /// Start a worker for `endpoint`.
    ///
    /// Opening happens on the worker thread. If it fails, a single
    /// [`DeviceEvent::ErrorOccurred`] is posted and the worker exits.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::SpawnFailed`] if the OS refuses the thread.
    pub fn spawn(
        endpoint: Endpoint,
        backend: Arc<AnyBackend>,
        config: WorkerConfig,
        events: mpsc::Sender<DeviceEvent>,
    ) -> Result<Self> {
        let shared = Arc::new(LinkShared::new(endpoint.clone()));
        let thread_shared = shared.clone();

        let thread = thread::Builder::new()
            .name(format!("semaforo-link-{endpoint}"))
            .spawn(move || read_loop(thread_shared, backend, config, events))
            .map_err(|e| HardwareError::spawn_failed(e.to_string()))?;

        debug!(endpoint = %endpoint, "Link worker spawned");

        Ok(Self {
            link: ActiveLink::new(shared.clone()),
            shared,
            thread: Some(thread),
        })
    }

    /// Cloneable command handle onto this worker's endpoint.
    pub fn link(&self) -> ActiveLink {
        self.link.clone()
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.shared.endpoint()
    }

    /// Write `command` plus a newline; `false` if the endpoint is closed or
    /// the write fails.
    pub fn send_command(&self, command: &str) -> bool {
        self.link.send_command(command)
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Request stop and close the endpoint.
    ///
    /// No event is posted after this returns. Idempotent.
    pub fn stop(&self) {
        if self.shared.is_running() {
            info!(endpoint = %self.endpoint(), "Stopping link worker");
        }
        self.shared.stop();
    }

    /// Stop the worker and wait for its thread to exit.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::WorkerPanicked`] if the thread panicked.
    pub fn join(mut self) -> Result<()> {
        self.stop();

        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| HardwareError::worker_panicked(self.endpoint().as_str())),
            None => Ok(()),
        }
    }
}

impl Drop for LinkWorker {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

fn read_loop(
    shared: Arc<LinkShared>,
    backend: Arc<AnyBackend>,
    config: WorkerConfig,
    events: mpsc::Sender<DeviceEvent>,
) {
    let endpoint = shared.endpoint().clone();

    let connection = match backend.open(&endpoint, &config.serial) {
        Ok(connection) => connection,
        Err(e) => {
            error!(endpoint = %endpoint, "Failed to open endpoint: {}", e);
            shared.emit(
                &events,
                DeviceEvent::ErrorOccurred(format!("ERROR: {e}")),
                config.idle_interval,
            );
            shared.stop();
            return;
        }
    };

    if !shared.install(connection) {
        debug!(endpoint = %endpoint, "Stopped before the endpoint was opened");
        return;
    }

    info!(endpoint = %endpoint, "Link worker listening");

    while shared.is_running() {
        match shared.poll_line() {
            Ok(Some(line)) => {
                debug!(endpoint = %endpoint, line = %line, "Line received");
                if let Some(event) = DeviceEvent::from_line(&line) {
                    debug!(endpoint = %endpoint, event = ?event, "Device event");
                    shared.emit(&events, event, config.idle_interval);
                }
            }
            Ok(None) => {}
            Err(e) => {
                if shared.is_running() {
                    warn!(endpoint = %endpoint, "Read failed, link worker exiting: {}", e);
                    shared.emit(
                        &events,
                        DeviceEvent::ErrorOccurred(format!("ERROR: {e}")),
                        config.idle_interval,
                    );
                }
                break;
            }
        }

        thread::sleep(config.idle_interval);
    }

    shared.stop();
    debug!(endpoint = %endpoint, "Link worker exited");
}
