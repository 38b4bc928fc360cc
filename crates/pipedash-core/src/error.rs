//! Error types for pipedash

use thiserror::Error;

/// Main error type for pipedash operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    /// The backend answered but refused the request
    #[error("Rejected by backend: {0}")]
    Rejected(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Error::Http(msg.into())
    }

    /// Create a stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Whether the failure happened below the application layer
    /// (unreachable host, timeout, broken channel).
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Timeout(_) | Error::Stream(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(err.to_string())
        } else if err.is_decode() {
            Error::Stream(err.to_string())
        } else {
            Error::Http(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(Error::http("connection refused").is_transport());
        assert!(Error::Timeout("3s".into()).is_transport());
        assert!(Error::stream("eof").is_transport());
        assert!(!Error::Rejected("invalid query".into()).is_transport());
        assert!(!Error::invalid_argument("empty").is_transport());
    }

    #[test]
    fn test_display() {
        let err = Error::Rejected("invalid query".into());
        assert_eq!(err.to_string(), "Rejected by backend: invalid query");
    }
}
