//! Prediction service message protocol
//!
//! One JSON object per WebSocket text frame, tagged by a `"type"` field.
//!
//! Client → service:
//! - `predict`: `{"type":"predict","current_input":..,"history":[..]}`
//! - `record`: `{"type":"record","command":..,"context":..|null}`
//!
//! Service → client:
//! - `predictions`: `{"type":"predictions","predictions":[{"command":..,"score":..}]}`
//! - `recorded`: acknowledgement of a `record`, ignored by the client
//! - `error`: `{"type":"error","message":..}`
//!
//! Replies carry no request id; they are matched to requests by position.
//! This only holds if a predict send and its receive are never interleaved
//! with another request, so both request kinds go through one lock and at
//! most one predict round trip is in flight.

use crate::error::{ProtocolError, TransportError};
use crate::predictor::transport::PredictionTransport;
use crate::predictor::types::{ConnectionState, Prediction};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Client → service messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Ask for completions of the current input
    #[serde(rename = "predict")]
    Predict {
        /// Trimmed input line
        current_input: String,
        /// Command history, oldest first
        history: Vec<String>,
    },
    /// Report an executed command (no reply expected)
    #[serde(rename = "record")]
    Record {
        command: String,
        /// Free-form context, serialized as `null` when absent
        context: Option<String>,
    },
}

/// Service → client messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServiceMessage {
    /// Ranked completions, best first
    #[serde(rename = "predictions")]
    Predictions { predictions: Vec<Prediction> },
    /// Acknowledgement of a `record`
    #[serde(rename = "recorded")]
    Recorded {
        #[serde(default)]
        status: Option<String>,
    },
    /// Service-side failure
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: String,
    },
}

/// Encode a message as one JSON text frame
pub fn encode_message(message: &ClientMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(ProtocolError::Encode)
}

/// Decode a service frame
///
/// Anything that is not a well-formed known message is `MalformedResponse`.
pub fn decode_message(frame: &str) -> Result<ServiceMessage, ProtocolError> {
    serde_json::from_str(frame).map_err(|e| ProtocolError::MalformedResponse(e.to_string()))
}

/// Marks the single predict slot as taken; releases it on drop
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct PredictionProtocol {
    transport: Mutex<PredictionTransport>,
    in_flight: AtomicBool,
    request_timeout: Duration,
    send_timeout: Duration,
}

impl PredictionProtocol {
    pub fn new(transport: PredictionTransport) -> Self {
        Self {
            transport: Mutex::new(transport),
            in_flight: AtomicBool::new(false),
            request_timeout: Duration::from_secs(2),
            send_timeout: Duration::from_secs(1),
        }
    }

    /// Bound on a whole predict round trip, including waiting for the connection
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Bound on a record send, including waiting for the connection
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Open (or reopen) the underlying connection
    pub fn connect(&self) -> Result<(), TransportError> {
        self.transport.lock().connect()
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.lock().state()
    }

    pub fn endpoint(&self) -> String {
        self.transport.lock().endpoint().to_string()
    }

    /// Whether a predict round trip is currently outstanding
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Send a predict request and wait for its `predictions` reply
    ///
    /// Fails with [`ProtocolError::Busy`] without touching the connection if
    /// another round trip is outstanding. `recorded` acknowledgements queued
    /// ahead of the reply are skipped. On timeout or a malformed reply the
    /// connection is closed, since the next frame on it could no longer be
    /// matched to a request.
    pub fn request_predictions(
        &self,
        input: &str,
        history: &[String],
    ) -> Result<Vec<Prediction>, ProtocolError> {
        let _slot = InFlight::acquire(&self.in_flight).ok_or(ProtocolError::Busy)?;
        let deadline = Instant::now() + self.request_timeout;

        let mut transport = self
            .transport
            .try_lock_until(deadline)
            .ok_or(TransportError::Timeout)?;
        if !transport.is_connected() {
            return Err(TransportError::NotConnected.into());
        }

        let request = encode_message(&ClientMessage::Predict {
            current_input: input.to_string(),
            history: history.to_vec(),
        })?;
        transport.send(&request)?;

        loop {
            let frame = match transport.receive_before(deadline) {
                Ok(frame) => frame,
                Err(TransportError::Timeout) => {
                    warn!("prediction request timed out, dropping connection");
                    transport.close();
                    return Err(TransportError::Timeout.into());
                }
                Err(TransportError::InvalidFrame(reason)) => {
                    warn!("undecodable reply ({}), dropping connection", reason);
                    transport.close();
                    return Err(ProtocolError::MalformedResponse(reason));
                }
                Err(e) => return Err(e.into()),
            };

            match decode_message(&frame) {
                Ok(ServiceMessage::Predictions { predictions }) => {
                    debug!(count = predictions.len(), "received predictions");
                    return Ok(predictions);
                }
                Ok(ServiceMessage::Recorded { .. }) => {
                    trace!("skipping record acknowledgement");
                }
                Ok(ServiceMessage::Error { message }) => {
                    return Err(ProtocolError::Remote(message));
                }
                Err(e) => {
                    warn!("{}, dropping connection", e);
                    transport.close();
                    return Err(e);
                }
            }
        }
    }

    /// Send a record request without waiting for a reply
    ///
    /// Waits at most the send timeout for the connection to be free.
    pub fn record_command(
        &self,
        command: &str,
        context: Option<String>,
    ) -> Result<(), ProtocolError> {
        let mut transport = self
            .transport
            .try_lock_for(self.send_timeout)
            .ok_or(TransportError::Timeout)?;
        if !transport.is_connected() {
            return Err(TransportError::NotConnected.into());
        }

        let message = encode_message(&ClientMessage::Record {
            command: command.to_string(),
            context,
        })?;
        transport.send(&message)?;
        Ok(())
    }

    /// Close the connection; safe to call repeatedly
    pub fn close(&self) {
        self.transport.lock().close();
    }
}
