//! Error types for astronomer-core

use thiserror::Error;

/// Main error type for the astronomer-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error (cookie jar / local store)
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Page location could not be parsed
    #[error("invalid page URL: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A raw call is missing a field its type requires
    #[error("invalid call: {0}")]
    InvalidCall(String),

    /// Transport failure or non-success response from the ingestion API
    #[error("delivery error: {0}")]
    Delivery(String),
}

impl Error {
    /// True for errors produced while building an envelope.
    pub fn is_invalid_call(&self) -> bool {
        matches!(self, Error::InvalidCall(_))
    }

    /// True for errors produced while delivering an envelope.
    pub fn is_delivery(&self) -> bool {
        matches!(self, Error::Delivery(_))
    }
}

/// Result type alias for astronomer-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_errors_convert() {
        fn parse(raw: &str) -> Result<serde_json::Value> {
            Ok(serde_json::from_str(raw)?)
        }

        let err = parse("{").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
        assert!(err.to_string().starts_with("JSON error:"));
        assert!(!err.is_invalid_call());
        assert!(!err.is_delivery());
    }

    #[test]
    fn test_kind_helpers() {
        assert!(Error::InvalidCall("x".to_string()).is_invalid_call());
        assert!(Error::Delivery("x".to_string()).is_delivery());
        assert!(!Error::Config("x".to_string()).is_delivery());
    }
}
