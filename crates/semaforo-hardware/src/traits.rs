//! Serial transport trait definitions.
//!
//! The link machinery never talks to the `serialport` crate directly. It goes
//! through two seams:
//!
//! - [`PortBackend`]: enumerates endpoints on the host and opens them.
//! - [`SerialConnection`]: one open endpoint, readable and writable as bytes.
//!
//! The real implementation lives in [`backend`](crate::backend); a scripted
//! one lives in [`mock`](crate::mock).

use std::io::{self, Read, Write};
use std::time::Duration;

use semaforo_core::Endpoint;
use semaforo_core::constants::{DEFAULT_BAUD_RATE, DEFAULT_IO_TIMEOUT_MS, LINE_TERMINATOR};

use crate::error::Result;

/// Settings applied when opening an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    /// Line speed in bits per second.
    pub baud_rate: u32,

    /// Timeout for a single blocking read or write.
    pub io_timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            io_timeout: Duration::from_millis(DEFAULT_IO_TIMEOUT_MS),
        }
    }
}

/// One open serial endpoint.
///
/// Dropping the connection closes the underlying OS handle.
pub trait SerialConnection: Read + Write + Send {
    /// Number of bytes buffered and ready to read.
    fn bytes_to_read(&self) -> io::Result<u32>;

    /// Discard everything in the input buffer.
    fn clear_input(&self) -> io::Result<()>;

    /// Read one line, without its terminator.
    ///
    /// Reads until `\n` or until the read timeout expires, returning what has
    /// arrived so far in the timeout case. Invalid UTF-8 is replaced rather
    /// than rejected.
    ///
    /// # Errors
    ///
    /// Returns any I/O error other than a timeout.
    fn read_line(&mut self) -> io::Result<String> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            match self.read(&mut byte) {
                Ok(0) => break,
                Ok(_) if byte[0] == LINE_TERMINATOR => break,
                Ok(_) => line.push(byte[0]),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(String::from_utf8_lossy(&line).into_owned())
    }
}

/// Source of serial endpoints.
///
/// Implementations must be shareable: the supervisor scans and probes from
/// one context while a link worker opens its endpoint from another.
pub trait PortBackend: Send + Sync {
    /// Enumerate candidate endpoints, freshly, in host order.
    ///
    /// A failed host query yields an empty list.
    fn list_endpoints(&self) -> Vec<Endpoint>;

    /// Open an endpoint exclusively.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint does not exist or cannot be opened.
    fn open(
        &self,
        endpoint: &Endpoint,
        settings: &SerialSettings,
    ) -> Result<Box<dyn SerialConnection>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted {
        input: VecDeque<io::Result<u8>>,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.input.pop_front() {
                Some(Ok(b)) => {
                    buf[0] = b;
                    Ok(1)
                }
                Some(Err(e)) => Err(e),
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "timeout")),
            }
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SerialConnection for Scripted {
        fn bytes_to_read(&self) -> io::Result<u32> {
            Ok(self.input.len() as u32)
        }

        fn clear_input(&self) -> io::Result<()> {
            Ok(())
        }
    }

    fn scripted(bytes: &[u8]) -> Scripted {
        Scripted {
            input: bytes.iter().map(|b| Ok(*b)).collect(),
        }
    }

    #[test]
    fn test_default_settings() {
        let settings = SerialSettings::default();
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.io_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_read_line_stops_at_terminator() {
        let mut conn = scripted(b"BUTTON_PRESSED\nNEXT\n");
        assert_eq!(conn.read_line().unwrap(), "BUTTON_PRESSED");
        assert_eq!(conn.read_line().unwrap(), "NEXT");
    }

    #[test]
    fn test_read_line_returns_partial_on_timeout() {
        let mut conn = scripted(b"HALF");
        assert_eq!(conn.read_line().unwrap(), "HALF");
        assert_eq!(conn.read_line().unwrap(), "");
    }

    #[test]
    fn test_read_line_replaces_invalid_utf8() {
        let mut conn = scripted(&[b'O', 0xFF, b'K', b'\n']);
        assert_eq!(conn.read_line().unwrap(), "O\u{FFFD}K");
    }

    #[test]
    fn test_read_line_propagates_hard_errors() {
        let mut conn = Scripted {
            input: VecDeque::from([
                Ok(b'A'),
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")),
            ]),
        };
        let error = conn.read_line().unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::BrokenPipe);
    }
}
