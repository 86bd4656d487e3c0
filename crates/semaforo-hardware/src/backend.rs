//! Port backends and enum dispatch.
//!
//! [`SerialBackend`] is the production backend built on the `serialport`
//! crate. [`AnyBackend`] wraps every backend in one concrete type so the
//! supervisor, the prober and the link workers can share a single
//! `Arc<AnyBackend>` without generics leaking into their signatures.
//!
//! # Examples
//!
//! ```no_run
//! use semaforo_hardware::backend::{AnyBackend, SerialBackend};
//! use semaforo_hardware::traits::PortBackend;
//!
//! let backend = AnyBackend::Serial(SerialBackend::new());
//! for endpoint in backend.list_endpoints() {
//!     println!("candidate: {endpoint}");
//! }
//! ```

use std::io::{self, Read, Write};

use semaforo_core::Endpoint;
use serialport::{ClearBuffer, SerialPort};
use tracing::{debug, trace, warn};

use crate::error::{HardwareError, Result};
use crate::mock::MockBackend;
use crate::traits::{PortBackend, SerialConnection, SerialSettings};

/// Backend that talks to the host's real serial ports.
#[derive(Debug, Clone, Default)]
pub struct SerialBackend;

impl SerialBackend {
    pub fn new() -> Self {
        Self
    }
}

impl PortBackend for SerialBackend {
    fn list_endpoints(&self) -> Vec<Endpoint> {
        match serialport::available_ports() {
            Ok(ports) => {
                let endpoints: Vec<Endpoint> = ports
                    .into_iter()
                    .filter_map(|info| Endpoint::new(&info.port_name).ok())
                    .collect();
                trace!(count = endpoints.len(), "Enumerated serial ports");
                endpoints
            }
            Err(e) => {
                warn!("Serial port enumeration failed: {}", e);
                Vec::new()
            }
        }
    }

    fn open(
        &self,
        endpoint: &Endpoint,
        settings: &SerialSettings,
    ) -> Result<Box<dyn SerialConnection>> {
        debug!(
            endpoint = %endpoint,
            baud_rate = settings.baud_rate,
            "Opening serial port"
        );

        let port = serialport::new(endpoint.as_str(), settings.baud_rate)
            .timeout(settings.io_timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice
                | serialport::ErrorKind::Io(io::ErrorKind::NotFound) => {
                    HardwareError::not_found(endpoint.as_str())
                }
                _ => HardwareError::open_failed(endpoint.as_str(), e.to_string()),
            })?;

        Ok(Box::new(SerialPortConnection { port }))
    }
}

/// An open port from the `serialport` crate.
struct SerialPortConnection {
    port: Box<dyn SerialPort>,
}

impl Read for SerialPortConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialPortConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl SerialConnection for SerialPortConnection {
    fn bytes_to_read(&self) -> io::Result<u32> {
        Ok(self.port.bytes_to_read()?)
    }

    fn clear_input(&self) -> io::Result<()> {
        Ok(self.port.clear(ClearBuffer::Input)?)
    }
}

/// Enum wrapper for backend dispatch.
///
/// # Examples
///
/// ```
/// use semaforo_hardware::backend::AnyBackend;
/// use semaforo_hardware::mock::{MockBackend, MockPort};
/// use semaforo_hardware::traits::PortBackend;
///
/// let (backend, handle) = MockBackend::new();
/// handle.add_port(MockPort::new("COM3"));
///
/// let backend = AnyBackend::Mock(backend);
/// assert_eq!(backend.list_endpoints().len(), 1);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum AnyBackend {
    /// Host serial ports.
    Serial(SerialBackend),

    /// Scripted ports for development and testing.
    Mock(MockBackend),
}

impl AnyBackend {
    pub fn is_mock(&self) -> bool {
        matches!(self, Self::Mock(_))
    }
}

impl PortBackend for AnyBackend {
    fn list_endpoints(&self) -> Vec<Endpoint> {
        match self {
            Self::Serial(backend) => backend.list_endpoints(),
            Self::Mock(backend) => backend.list_endpoints(),
        }
    }

    fn open(
        &self,
        endpoint: &Endpoint,
        settings: &SerialSettings,
    ) -> Result<Box<dyn SerialConnection>> {
        match self {
            Self::Serial(backend) => backend.open(endpoint, settings),
            Self::Mock(backend) => backend.open(endpoint, settings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPort;

    #[test]
    fn test_any_backend_dispatches_to_mock() {
        let (mock, handle) = MockBackend::new();
        handle.add_port(MockPort::new("COM3"));
        handle.add_port(MockPort::new("COM5"));

        let backend = AnyBackend::Mock(mock);
        assert!(backend.is_mock());

        let names: Vec<String> = backend
            .list_endpoints()
            .iter()
            .map(|e| e.to_string())
            .collect();
        assert_eq!(names, vec!["COM3", "COM5"]);

        let endpoint = Endpoint::new("COM5").unwrap();
        let conn = backend.open(&endpoint, &SerialSettings::default());
        assert!(conn.is_ok());
        assert_eq!(handle.open_count("COM5"), 1);
    }

    #[test]
    fn test_serial_backend_missing_port() {
        let backend = SerialBackend::new();
        let endpoint = Endpoint::new("/dev/semaforo-does-not-exist").unwrap();
        let result = backend.open(&endpoint, &SerialSettings::default());
        assert!(result.is_err());
    }
}
