//! Error types for the GTSDB client library

use std::time::Duration;
use thiserror::Error;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur during client operations
#[derive(Error, Debug)]
pub enum ClientError {
    /// Connection could not be established
    #[error("Connection failed to {addr}: {reason}")]
    ConnectionFailed { addr: String, reason: String },

    /// Operation attempted while the client is not connected
    #[error("Not connected")]
    NotConnected,

    /// Peer closed the stream while an operation was pending
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No response arrived within the configured budget
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Malformed protocol line
    #[error("Protocol parse error: {0}")]
    Parse(#[from] ParseError),

    /// NaN or infinite values cannot be written
    #[error("Cannot write non-finite value {value} for {key}")]
    NonFiniteValue { key: String, value: f64 },

    /// The server returned no records for the query
    #[error("No data found for {key}")]
    NoData { key: String },

    /// The server returned records, but none of them could be parsed
    #[error("No valid measurements found for {key} ({skipped} malformed records)")]
    NoValidMeasurements { key: String, skipped: usize },
}

impl ClientError {
    /// Create a connection failed error
    pub fn connection_failed(addr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            addr: addr.into(),
            reason: reason.into(),
        }
    }

    /// Create a no data error
    pub fn no_data(key: impl Into<String>) -> Self {
        Self::NoData { key: key.into() }
    }

    /// True for errors that leave the connection unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::ConnectionClosed | Self::Io(_)
        )
    }
}

/// A protocol line that does not match `key,timestamp,value`
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("expected 3 fields, found {found} in {line:?}")]
    FieldCount { found: usize, line: String },

    #[error("invalid timestamp {field:?}")]
    InvalidTimestamp { field: String },

    #[error("invalid value {field:?}")]
    InvalidValue { field: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::connection_failed("localhost:5555", "connection refused");
        assert_eq!(
            err.to_string(),
            "Connection failed to localhost:5555: connection refused"
        );

        let err = ClientError::no_data("sensor1");
        assert_eq!(err.to_string(), "No data found for sensor1");

        let err = ClientError::NonFiniteValue {
            key: "sensor1".to_string(),
            value: f64::INFINITY,
        };
        assert_eq!(err.to_string(), "Cannot write non-finite value inf for sensor1");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ClientError::ConnectionClosed.is_fatal());
        assert!(ClientError::NotConnected.is_fatal());
        assert!(!ClientError::no_data("k").is_fatal());
        assert!(!ClientError::Timeout {
            operation: "query",
            after: Duration::from_secs(1)
        }
        .is_fatal());
    }

    #[test]
    fn test_parse_error_converts() {
        let parse = ParseError::InvalidValue {
            field: "abc".to_string(),
        };
        let err: ClientError = parse.clone().into();
        assert!(matches!(err, ClientError::Parse(p) if p == parse));
    }
}
