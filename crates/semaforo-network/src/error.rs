//! Decision request errors.

use semaforo_core::StatusMessage;
use thiserror::Error;

/// Result type alias for decision requests.
pub type Result<T> = std::result::Result<T, DecisionError>;

/// Why a decision request produced no decision.
///
/// None of these are fatal: the kiosk shows the matching status message and
/// waits for the next button press.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecisionError {
    /// The service could not be reached.
    #[error("Decision service unreachable: {0}")]
    Transport(String),

    /// No response within the request timeout.
    #[error("Decision request timed out")]
    Timeout,

    /// The service answered with a status other than 200.
    #[error("Decision service returned HTTP {0}")]
    Status(u16),

    /// The service answered 200 without `success: true`.
    #[error("Decision service rejected the request")]
    Rejected,

    /// The body was not a decision document.
    #[error("Invalid decision body: {0}")]
    InvalidBody(String),
}

impl DecisionError {
    /// Create a new transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new invalid body error.
    pub fn invalid_body(message: impl Into<String>) -> Self {
        Self::InvalidBody(message.into())
    }

    /// Status message shown to the user for this failure.
    pub fn status_message(&self) -> StatusMessage {
        match self {
            Self::Rejected => StatusMessage::ServerError,
            Self::Status(code) => StatusMessage::HttpError(*code),
            Self::Transport(_) | Self::Timeout | Self::InvalidBody(_) => {
                StatusMessage::ConnectionError
            }
        }
    }
}

impl From<reqwest::Error> for DecisionError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::invalid_body(error.to_string())
        } else {
            Self::transport(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_messages() {
        assert_eq!(
            DecisionError::Rejected.status_message().text(),
            "ERROR DE SERVIDOR"
        );
        assert_eq!(DecisionError::Status(503).status_message().text(), "ERROR 503");
        assert_eq!(
            DecisionError::Timeout.status_message(),
            StatusMessage::ConnectionError
        );
        assert_eq!(
            DecisionError::invalid_body("expected value").status_message(),
            StatusMessage::ConnectionError
        );
        assert_eq!(
            DecisionError::transport("dns").status_message(),
            StatusMessage::ConnectionError
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            DecisionError::Status(404).to_string(),
            "Decision service returned HTTP 404"
        );
        assert_eq!(
            DecisionError::transport("connection refused").to_string(),
            "Decision service unreachable: connection refused"
        );
    }
}
