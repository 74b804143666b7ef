//! Command prediction client
//!
//! Layers, leaf first:
//! - `transport`: one WebSocket connection to the prediction service
//! - `protocol`: typed predict/record messages over the transport
//! - `session`: the host-facing orchestrator with history fallback
//! - `types`: suggestion, context and status types shared with the host

pub mod protocol;
pub mod session;
pub mod transport;
pub mod types;

pub use protocol::{
    decode_message, encode_message, ClientMessage, PredictionProtocol, ServiceMessage,
};
pub use session::PredictionSession;
pub use transport::PredictionTransport;
pub use types::{
    CommandSuggestion, ConnectionState, Prediction, PredictionContext, SessionStatus,
    StatusEvent, SuggestionSource,
};
