use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid endpoint name: {0:?}")]
    InvalidEndpoint(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::InvalidEndpoint(String::new()).to_string(),
            "Invalid endpoint name: \"\""
        );
        assert_eq!(
            Error::Config("missing api_key".to_string()).to_string(),
            "Configuration error: missing api_key"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "config.json");
        let error: Error = io.into();
        assert!(matches!(error, Error::Io(_)));
    }
}
