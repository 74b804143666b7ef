//! Error types for the prediction client
//!
//! Each layer has its own error enum:
//! - [`TransportError`]: connection lifecycle and framing failures
//! - [`ProtocolError`]: message encoding/decoding and request policy
//! - [`HistoryError`]: history file persistence
//! - [`ConfigError`]: settings file loading
//!
//! None of these are fatal to the host. The session recovers from transport
//! and protocol errors by falling back to history matching, and persistence
//! errors only cost durability.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the socket transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// Operation requires an open connection
    #[error("not connected to prediction service")]
    NotConnected,

    /// No complete frame arrived (or could be written) before the deadline
    #[error("prediction service timed out")]
    Timeout,

    /// Peer closed the connection
    #[error("prediction service closed the connection")]
    ConnectionClosed,

    /// Frame arrived intact but its payload is not UTF-8 text
    #[error("prediction service sent a non-text frame: {0}")]
    InvalidFrame(String),

    /// Endpoint could not be parsed or uses an unsupported scheme
    #[error("invalid prediction endpoint '{0}'")]
    InvalidEndpoint(String),

    /// WebSocket upgrade failed after the TCP connection was made
    #[error("handshake with {endpoint} failed: {source}")]
    Handshake {
        endpoint: String,
        #[source]
        source: tungstenite::Error,
    },

    /// Socket level I/O failure
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// Framing failure reported by the WebSocket layer
    #[error("WebSocket error: {0}")]
    WebSocket(#[source] tungstenite::Error),
}

impl TransportError {
    /// Classify an I/O error, mapping socket timeouts to [`TransportError::Timeout`]
    pub(crate) fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportError::Timeout,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => TransportError::ConnectionClosed,
            _ => TransportError::Io(err),
        }
    }

    /// Classify an error from the WebSocket layer
    pub(crate) fn from_ws(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                TransportError::ConnectionClosed
            }
            tungstenite::Error::Io(e) => TransportError::from_io(e),
            other => TransportError::WebSocket(other),
        }
    }
}

/// Errors raised while exchanging typed messages with the service
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Reply was not valid JSON, had no/unknown `type`, or fields of the wrong shape
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Service replied with an explicit error message
    #[error("prediction service error: {0}")]
    Remote(String),

    /// Another prediction round trip is already in flight
    #[error("a prediction request is already in flight")]
    Busy,

    /// Request could not be serialized
    #[error("failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Errors raised while loading or saving the history file
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to read history file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("history file {path} is not a JSON array of strings: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write history file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors raised while loading settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_kinds_map_to_timeout() {
        let err = TransportError::from_io(io::Error::new(io::ErrorKind::WouldBlock, "x"));
        assert!(matches!(err, TransportError::Timeout));

        let err = TransportError::from_io(io::Error::new(io::ErrorKind::TimedOut, "x"));
        assert!(matches!(err, TransportError::Timeout));
    }

    #[test]
    fn test_reset_maps_to_connection_closed() {
        let err = TransportError::from_io(io::Error::new(io::ErrorKind::ConnectionReset, "x"));
        assert!(matches!(err, TransportError::ConnectionClosed));

        let err = TransportError::from_ws(tungstenite::Error::ConnectionClosed);
        assert!(matches!(err, TransportError::ConnectionClosed));
    }

    #[test]
    fn test_other_io_errors_are_kept() {
        let err = TransportError::from_io(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        assert!(matches!(err, TransportError::Io(_)));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::from(TransportError::NotConnected);
        assert!(err.to_string().contains("not connected"));

        let err = ProtocolError::MalformedResponse("missing field `type`".to_string());
        assert!(err.to_string().contains("malformed response"));
    }

    #[test]
    fn test_history_error_mentions_path() {
        let err = HistoryError::Read {
            path: PathBuf::from("/tmp/history.json"),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().contains("/tmp/history.json"));
    }
}
