//! Error types for the device link.
//!
//! [`HardwareError`] covers failures of the link machinery itself (opening a
//! port, spawning or joining a worker). [`ProbeError`] is the per-candidate
//! outcome of a handshake: it is expected and never fatal, the supervisor
//! simply moves on to the next endpoint.

use semaforo_core::Endpoint;

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur while operating a serial link.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Endpoint is not present on the host.
    #[error("Endpoint not found: {endpoint}")]
    NotFound { endpoint: String },

    /// Endpoint exists but could not be opened.
    #[error("Failed to open {endpoint}: {message}")]
    OpenFailed { endpoint: String, message: String },

    /// The link worker thread could not be started.
    #[error("Failed to spawn link worker: {message}")]
    SpawnFailed { message: String },

    /// The link worker thread panicked.
    #[error("Link worker for {endpoint} panicked")]
    WorkerPanicked { endpoint: String },

    /// Serial driver error.
    #[error("Serial error: {0}")]
    Serial(#[from] serialport::Error),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    /// Create a new not found error.
    pub fn not_found(endpoint: impl Into<String>) -> Self {
        Self::NotFound {
            endpoint: endpoint.into(),
        }
    }

    /// Create a new open failed error.
    pub fn open_failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OpenFailed {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a new spawn failed error.
    pub fn spawn_failed(message: impl Into<String>) -> Self {
        Self::SpawnFailed {
            message: message.into(),
        }
    }

    /// Create a new worker panicked error.
    pub fn worker_panicked(endpoint: impl Into<String>) -> Self {
        Self::WorkerPanicked {
            endpoint: endpoint.into(),
        }
    }
}

/// Why a candidate endpoint was rejected during probing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    /// The device never answered with the readiness token.
    #[error("No readiness token from {endpoint} after {rounds} rounds")]
    NoResponse { endpoint: Endpoint, rounds: u32 },

    /// Opening, writing or reading the endpoint failed.
    #[error("I/O failure while probing {endpoint}: {message}")]
    IoFailure { endpoint: Endpoint, message: String },
}

impl ProbeError {
    /// Create a new I/O failure from any displayable error.
    pub fn io_failure(endpoint: &Endpoint, error: impl std::fmt::Display) -> Self {
        Self::IoFailure {
            endpoint: endpoint.clone(),
            message: error.to_string(),
        }
    }

    /// The endpoint that was rejected.
    pub fn endpoint(&self) -> &Endpoint {
        match self {
            Self::NoResponse { endpoint, .. } | Self::IoFailure { endpoint, .. } => endpoint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_failed_error() {
        let error = HardwareError::open_failed("COM3", "Access is denied");
        assert!(matches!(error, HardwareError::OpenFailed { .. }));
        assert_eq!(error.to_string(), "Failed to open COM3: Access is denied");
    }

    #[test]
    fn test_not_found_error() {
        let error = HardwareError::not_found("/dev/ttyUSB9");
        assert_eq!(error.to_string(), "Endpoint not found: /dev/ttyUSB9");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let error: HardwareError = io.into();
        assert!(matches!(error, HardwareError::Io(_)));
    }

    #[test]
    fn test_probe_error_display() {
        let endpoint = Endpoint::new("COM3").unwrap();
        let error = ProbeError::NoResponse {
            endpoint: endpoint.clone(),
            rounds: 3,
        };
        assert_eq!(
            error.to_string(),
            "No readiness token from COM3 after 3 rounds"
        );
        assert_eq!(error.endpoint(), &endpoint);

        let error = ProbeError::io_failure(&endpoint, "port busy");
        assert_eq!(error.to_string(), "I/O failure while probing COM3: port busy");
    }
}
