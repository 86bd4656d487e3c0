//! Scripted serial ports for testing and development.
//!
//! A [`MockBackend`] exposes a set of simulated endpoints. Tests describe each
//! endpoint with a [`MockPort`] (does it open, on which wake round does it
//! answer the handshake) and then drive and inspect it through the cloneable
//! [`MockBackendHandle`]: push inbound lines, read back the bytes the kiosk
//! wrote, count opens and currently open handles.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use semaforo_core::Endpoint;
use semaforo_core::constants::{LINE_TERMINATOR, READY_TOKEN};

use crate::error::{HardwareError, Result};
use crate::traits::{PortBackend, SerialConnection, SerialSettings};

/// Description of one simulated endpoint.
///
/// # Examples
///
/// ```
/// use semaforo_hardware::mock::MockPort;
///
/// // Answers the handshake on the second wake newline
/// let port = MockPort::new("COM5").ready_on_round(2);
///
/// // Shows up in scans but refuses to open
/// let busy = MockPort::new("COM3").fail_open("Access is denied");
/// ```
#[derive(Debug, Clone)]
pub struct MockPort {
    name: String,
    ready_on_round: Option<u32>,
    open_error: Option<String>,
}

impl MockPort {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ready_on_round: None,
            open_error: None,
        }
    }

    /// Reply with the readiness token after the given wake newline (1-based).
    pub fn ready_on_round(mut self, round: u32) -> Self {
        self.ready_on_round = Some(round);
        self
    }

    /// Make every open attempt fail with this message.
    pub fn fail_open(mut self, message: impl Into<String>) -> Self {
        self.open_error = Some(message.into());
        self
    }
}

#[derive(Debug)]
struct PortState {
    script: MockPort,
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    wake_rounds: u32,
    opens: u32,
    open_handles: u32,
    max_open_handles: u32,
    fail_writes: bool,
    read_error: Option<String>,
}

impl PortState {
    fn new(script: MockPort) -> Self {
        Self {
            script,
            inbound: VecDeque::new(),
            written: Vec::new(),
            wake_rounds: 0,
            opens: 0,
            open_handles: 0,
            max_open_handles: 0,
            fail_writes: false,
            read_error: None,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    ports: Vec<PortState>,
}

impl MockState {
    fn port(&self, name: &str) -> Option<&PortState> {
        self.ports.iter().find(|p| p.script.name == name)
    }

    fn port_mut(&mut self, name: &str) -> Option<&mut PortState> {
        self.ports.iter_mut().find(|p| p.script.name == name)
    }
}

type Shared = Arc<Mutex<MockState>>;

fn lock(state: &Shared) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Port backend serving scripted endpoints.
///
/// # Examples
///
/// ```
/// use semaforo_core::Endpoint;
/// use semaforo_hardware::mock::{MockBackend, MockPort};
/// use semaforo_hardware::traits::{PortBackend, SerialConnection, SerialSettings};
///
/// let (backend, handle) = MockBackend::new();
/// handle.add_port(MockPort::new("COM3"));
///
/// let endpoint = Endpoint::new("COM3").unwrap();
/// let mut conn = backend.open(&endpoint, &SerialSettings::default()).unwrap();
///
/// handle.push_line("COM3", "BUTTON_PRESSED");
/// assert_eq!(conn.read_line().unwrap(), "BUTTON_PRESSED");
/// ```
#[derive(Debug, Clone)]
pub struct MockBackend {
    state: Shared,
}

impl MockBackend {
    /// Create an empty backend and the handle that controls it.
    pub fn new() -> (Self, MockBackendHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            Self {
                state: state.clone(),
            },
            MockBackendHandle { state },
        )
    }
}

impl PortBackend for MockBackend {
    fn list_endpoints(&self) -> Vec<Endpoint> {
        lock(&self.state)
            .ports
            .iter()
            .filter_map(|p| Endpoint::new(&p.script.name).ok())
            .collect()
    }

    fn open(
        &self,
        endpoint: &Endpoint,
        _settings: &SerialSettings,
    ) -> Result<Box<dyn SerialConnection>> {
        let mut state = lock(&self.state);
        let port = state
            .port_mut(endpoint.as_str())
            .ok_or_else(|| HardwareError::not_found(endpoint.as_str()))?;

        if let Some(message) = &port.script.open_error {
            return Err(HardwareError::open_failed(endpoint.as_str(), message.clone()));
        }

        // Opening resets the board, so the handshake starts over
        port.wake_rounds = 0;
        port.opens += 1;
        port.open_handles += 1;
        port.max_open_handles = port.max_open_handles.max(port.open_handles);

        Ok(Box::new(MockConnection {
            state: self.state.clone(),
            name: endpoint.as_str().to_string(),
        }))
    }
}

/// Handle for controlling a mock backend.
///
/// Cloneable; every clone sees the same endpoints.
#[derive(Debug, Clone)]
pub struct MockBackendHandle {
    state: Shared,
}

impl MockBackendHandle {
    /// Make an endpoint visible to scans. Ports are listed in insertion order.
    pub fn add_port(&self, port: MockPort) {
        lock(&self.state).ports.push(PortState::new(port));
    }

    /// Unplug an endpoint. Already open connections keep working.
    pub fn remove_port(&self, name: &str) {
        lock(&self.state).ports.retain(|p| p.script.name != name);
    }

    /// Queue one inbound line; the terminator is appended.
    pub fn push_line(&self, name: &str, line: &str) {
        self.push_bytes(name, line.as_bytes());
        self.push_bytes(name, &[LINE_TERMINATOR]);
    }

    /// Queue raw inbound bytes.
    pub fn push_bytes(&self, name: &str, bytes: &[u8]) {
        if let Some(port) = lock(&self.state).port_mut(name) {
            port.inbound.extend(bytes.iter().copied());
        }
    }

    /// Make writes fail with a broken pipe.
    pub fn set_fail_writes(&self, name: &str, fail: bool) {
        if let Some(port) = lock(&self.state).port_mut(name) {
            port.fail_writes = fail;
        }
    }

    /// Make the next reads fail with this message.
    pub fn set_read_error(&self, name: &str, message: Option<&str>) {
        if let Some(port) = lock(&self.state).port_mut(name) {
            port.read_error = message.map(str::to_string);
        }
    }

    /// Everything written to the endpoint, lossily decoded.
    pub fn written(&self, name: &str) -> String {
        lock(&self.state)
            .port(name)
            .map(|p| String::from_utf8_lossy(&p.written).into_owned())
            .unwrap_or_default()
    }

    /// Non-empty lines written to the endpoint (wake newlines excluded).
    pub fn commands(&self, name: &str) -> Vec<String> {
        self.written(name)
            .split('\n')
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Number of wake newlines received since the last open.
    pub fn wake_rounds(&self, name: &str) -> u32 {
        lock(&self.state).port(name).map_or(0, |p| p.wake_rounds)
    }

    /// Number of successful opens so far.
    pub fn open_count(&self, name: &str) -> u32 {
        lock(&self.state).port(name).map_or(0, |p| p.opens)
    }

    /// Number of connections currently open.
    pub fn open_handles(&self, name: &str) -> u32 {
        lock(&self.state).port(name).map_or(0, |p| p.open_handles)
    }

    /// Highest number of simultaneously open connections seen.
    pub fn max_open_handles(&self, name: &str) -> u32 {
        lock(&self.state).port(name).map_or(0, |p| p.max_open_handles)
    }

    /// Total open connections across all endpoints.
    pub fn total_open_handles(&self) -> u32 {
        lock(&self.state).ports.iter().map(|p| p.open_handles).sum()
    }
}

/// An open scripted endpoint.
///
/// Reads never block: an empty input buffer behaves like an expired read
/// timeout.
struct MockConnection {
    state: Shared,
    name: String,
}

impl Read for MockConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = lock(&self.state);
        let port = state
            .port_mut(&self.name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port removed"))?;

        if let Some(message) = &port.read_error {
            return Err(io::Error::other(message.clone()));
        }
        if port.inbound.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"));
        }

        let count = buf.len().min(port.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(port.inbound.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}

impl Write for MockConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = lock(&self.state);
        let port = state
            .port_mut(&self.name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port removed"))?;

        if port.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed"));
        }

        port.written.extend_from_slice(buf);

        if buf == [LINE_TERMINATOR] {
            port.wake_rounds += 1;
            if port.script.ready_on_round == Some(port.wake_rounds) {
                port.inbound.extend(READY_TOKEN.as_bytes());
                port.inbound.push_back(LINE_TERMINATOR);
            }
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialConnection for MockConnection {
    fn bytes_to_read(&self) -> io::Result<u32> {
        let state = lock(&self.state);
        let port = state
            .port(&self.name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port removed"))?;
        Ok(port.inbound.len() as u32)
    }

    fn clear_input(&self) -> io::Result<()> {
        if let Some(port) = lock(&self.state).port_mut(&self.name) {
            port.inbound.clear();
        }
        Ok(())
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        if let Some(port) = lock(&self.state).port_mut(&self.name) {
            port.open_handles = port.open_handles.saturating_sub(1);
        }
    }
}
