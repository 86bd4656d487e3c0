//! Command links to the traffic-light controller.
//!
//! The rest of the kiosk only ever needs one capability from the device:
//! "send this command line". [`Link`] provides it over exactly two
//! implementations:
//!
//! - [`ActiveLink`]: a cheap handle onto the endpoint owned by a running
//!   [`LinkWorker`](crate::worker::LinkWorker).
//! - [`FallbackLink`]: no hardware; every command is logged and reported as
//!   delivered.
//!
//! `send_command` never fails loudly. `false` means "not delivered" and no
//! retry is owed by this layer.

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use semaforo_core::constants::LINE_TERMINATOR;
use semaforo_core::{DeviceEvent, Endpoint};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, trace, warn};

use crate::traits::SerialConnection;

/// State shared between a link worker and its handles.
///
/// The port slot mutex also serializes event emission against `stop`, so
/// once `stop` returns no further event can be sent.
pub(crate) struct LinkShared {
    endpoint: Endpoint,
    running: AtomicBool,
    port: Mutex<Option<Box<dyn SerialConnection>>>,
}

impl LinkShared {
    pub(crate) fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            running: AtomicBool::new(true),
            port: Mutex::new(None),
        }
    }

    pub(crate) fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn port(&self) -> MutexGuard<'_, Option<Box<dyn SerialConnection>>> {
        self.port.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand the freshly opened connection to the slot.
    ///
    /// Returns `false` (and closes the connection) if stop was requested
    /// while the worker was opening.
    pub(crate) fn install(&self, connection: Box<dyn SerialConnection>) -> bool {
        let mut slot = self.port();
        if !self.is_running() {
            return false;
        }
        *slot = Some(connection);
        true
    }

    /// Read one line if input is buffered.
    pub(crate) fn poll_line(&self) -> io::Result<Option<String>> {
        let mut slot = self.port();
        let Some(connection) = slot.as_mut() else {
            return Ok(None);
        };

        if connection.bytes_to_read()? == 0 {
            return Ok(None);
        }
        connection.read_line().map(Some)
    }

    /// Deliver an event unless stop has been requested.
    ///
    /// Waits `backoff` between attempts while the channel is full. Returns
    /// `false` if the event was dropped because the link stopped or the
    /// receiver is gone.
    pub(crate) fn emit(
        &self,
        events: &mpsc::Sender<DeviceEvent>,
        event: DeviceEvent,
        backoff: Duration,
    ) -> bool {
        let mut event = event;
        loop {
            let slot = self.port();
            if !self.is_running() {
                trace!(endpoint = %self.endpoint, "Dropping event after stop");
                return false;
            }

            match events.try_send(event) {
                Ok(()) => return true,
                Err(TrySendError::Full(pending)) => event = pending,
                Err(TrySendError::Closed(_)) => return false,
            }

            drop(slot);
            thread::sleep(backoff);
        }
    }

    /// Request stop and close the endpoint.
    pub(crate) fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if self.port().take().is_some() {
            debug!(endpoint = %self.endpoint, "Endpoint closed");
        }
    }

    fn is_open(&self) -> bool {
        self.port().is_some()
    }

    fn send_command(&self, command: &str) -> bool {
        let mut slot = self.port();
        let Some(connection) = slot.as_mut() else {
            debug!(endpoint = %self.endpoint, command, "Endpoint not open, command dropped");
            return false;
        };

        let mut line = Vec::with_capacity(command.len() + 1);
        line.extend_from_slice(command.as_bytes());
        line.push(LINE_TERMINATOR);

        match connection
            .write_all(&line)
            .and_then(|()| connection.flush())
        {
            Ok(()) => {
                info!(endpoint = %self.endpoint, command, "Command sent");
                true
            }
            Err(e) => {
                warn!(endpoint = %self.endpoint, command, "Command write failed: {}", e);
                false
            }
        }
    }
}

impl fmt::Debug for LinkShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkShared")
            .field("endpoint", &self.endpoint)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Handle onto an endpoint owned by a link worker.
///
/// Cloning is cheap; all clones refer to the same endpoint.
#[derive(Clone)]
pub struct ActiveLink {
    shared: Arc<LinkShared>,
}

impl ActiveLink {
    pub(crate) fn new(shared: Arc<LinkShared>) -> Self {
        Self { shared }
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.shared.endpoint()
    }

    /// Write `command` plus a newline if the endpoint is open.
    pub fn send_command(&self, command: &str) -> bool {
        self.shared.send_command(command)
    }

    /// Whether the worker currently holds an open endpoint.
    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// Whether the worker has not been asked to stop and has not exited.
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }
}

impl fmt::Debug for ActiveLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveLink")
            .field("endpoint", self.endpoint())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Stand-in link used when no controller is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackLink;

impl FallbackLink {
    pub fn new() -> Self {
        Self
    }

    /// Log the command and report it as delivered.
    pub fn send_command(&self, command: &str) -> bool {
        info!(command, "Command sent (simulated)");
        true
    }
}

/// The link currently used to reach the device.
#[derive(Debug, Clone)]
pub enum Link {
    Active(ActiveLink),
    Fallback(FallbackLink),
}

impl Link {
    pub fn send_command(&self, command: &str) -> bool {
        match self {
            Self::Active(link) => link.send_command(command),
            Self::Fallback(link) => link.send_command(command),
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    /// Endpoint behind the link; `None` in fallback mode.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        match self {
            Self::Active(link) => Some(link.endpoint()),
            Self::Fallback(_) => None,
        }
    }
}

impl From<ActiveLink> for Link {
    fn from(link: ActiveLink) -> Self {
        Self::Active(link)
    }
}

impl From<FallbackLink> for Link {
    fn from(link: FallbackLink) -> Self {
        Self::Fallback(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, MockPort};
    use crate::traits::{PortBackend, SerialSettings};

    fn open_shared(name: &str) -> (Arc<LinkShared>, crate::mock::MockBackendHandle) {
        let (backend, handle) = MockBackend::new();
        handle.add_port(MockPort::new(name));
        let endpoint = Endpoint::new(name).unwrap();
        let connection = backend.open(&endpoint, &SerialSettings::default()).unwrap();

        let shared = Arc::new(LinkShared::new(endpoint));
        assert!(shared.install(connection));
        (shared, handle)
    }

    #[test]
    fn test_fallback_always_succeeds() {
        let link = Link::from(FallbackLink::new());
        assert!(link.is_simulated());
        assert!(link.endpoint().is_none());
        assert!(link.send_command("SUCCESS_GREEN"));
        assert!(link.send_command(""));
    }

    #[test]
    fn test_active_send_appends_newline() {
        let (shared, handle) = open_shared("COM3");
        let link = Link::from(ActiveLink::new(shared));

        assert!(!link.is_simulated());
        assert!(link.send_command("POLICE_SIREN"));
        assert_eq!(handle.written("COM3"), "POLICE_SIREN\n");
    }

    #[test]
    fn test_active_send_preserves_command_verbatim() {
        let (shared, handle) = open_shared("COM3");
        let link = ActiveLink::new(shared);

        assert!(link.send_command("Custom Cmd 42"));
        assert_eq!(handle.commands("COM3"), vec!["Custom Cmd 42"]);
    }

    #[test]
    fn test_send_on_closed_link_returns_false() {
        let (shared, handle) = open_shared("COM3");
        let link = ActiveLink::new(shared.clone());

        shared.stop();

        assert!(!link.is_open());
        assert!(!link.send_command("SUCCESS_GREEN"));
        assert_eq!(handle.written("COM3"), "");
        assert_eq!(handle.open_handles("COM3"), 0);
    }

    #[test]
    fn test_send_before_open_returns_false() {
        let shared = Arc::new(LinkShared::new(Endpoint::new("COM3").unwrap()));
        let link = ActiveLink::new(shared);
        assert!(!link.send_command("SUCCESS_GREEN"));
    }

    #[test]
    fn test_write_failure_returns_false() {
        let (shared, handle) = open_shared("COM3");
        handle.set_fail_writes("COM3", true);

        let link = ActiveLink::new(shared);
        assert!(!link.send_command("SUCCESS_GREEN"));
    }

    #[test]
    fn test_install_after_stop_closes_connection() {
        let (backend, handle) = MockBackend::new();
        handle.add_port(MockPort::new("COM3"));
        let endpoint = Endpoint::new("COM3").unwrap();

        let shared = LinkShared::new(endpoint.clone());
        shared.stop();

        let connection = backend.open(&endpoint, &SerialSettings::default()).unwrap();
        assert!(!shared.install(connection));
        assert_eq!(handle.open_handles("COM3"), 0);
    }

    #[test]
    fn test_emit_is_suppressed_after_stop() {
        let (shared, _handle) = open_shared("COM3");
        let (tx, mut rx) = mpsc::channel(4);

        assert!(shared.emit(&tx, DeviceEvent::ButtonPressed, Duration::ZERO));
        shared.stop();
        assert!(!shared.emit(&tx, DeviceEvent::ButtonPressed, Duration::ZERO));

        assert_eq!(rx.try_recv().unwrap(), DeviceEvent::ButtonPressed);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_emit_reports_closed_receiver() {
        let (shared, _handle) = open_shared("COM3");
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        assert!(!shared.emit(&tx, DeviceEvent::ButtonPressed, Duration::ZERO));
    }
}
