//! Types exchanged with the host line editor

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a suggestion came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuggestionSource {
    /// Ranked by the remote prediction service
    AI,
    /// Prefix match against local history
    History,
    /// Built-in suggestion not tied to either of the above
    Default,
}

impl fmt::Display for SuggestionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SuggestionSource::AI => "AI",
            SuggestionSource::History => "History",
            SuggestionSource::Default => "Default",
        };
        f.write_str(name)
    }
}

/// One ranked completion for the current input line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSuggestion {
    command: String,
    description: String,
    source: SuggestionSource,
}

impl CommandSuggestion {
    pub fn new(
        command: impl Into<String>,
        description: impl Into<String>,
        source: SuggestionSource,
    ) -> Self {
        Self {
            command: command.into(),
            description: description.into(),
            source,
        }
    }

    /// Suggestion ranked by the service, annotated with its score
    pub fn from_prediction(command: impl Into<String>, score: f64) -> Self {
        Self::new(
            command,
            format!("AI Prediction (Score: {:.2})", score),
            SuggestionSource::AI,
        )
    }

    /// Suggestion taken from local history
    pub fn from_history(command: impl Into<String>) -> Self {
        Self::new(command, "From history", SuggestionSource::History)
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn source(&self) -> SuggestionSource {
        self.source
    }
}

/// Input state for one prediction query
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PredictionContext {
    /// Full line as typed
    pub input_text: String,
    /// Cursor offset into `input_text`
    pub cursor_position: usize,
    /// Caller's tokenization of the line, if it has one. Not used for ranking.
    pub tokens: Option<Vec<String>>,
}

impl PredictionContext {
    pub fn new(input_text: impl Into<String>, cursor_position: usize) -> Self {
        Self {
            input_text: input_text.into(),
            cursor_position,
            tokens: None,
        }
    }

    pub fn with_tokens(mut self, tokens: Vec<String>) -> Self {
        self.tokens = Some(tokens);
        self
    }
}

/// One candidate returned by the prediction service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub command: String,
    pub score: f64,
}

/// Connection lifecycle of the prediction transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
    Closed,
    Faulted,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
            ConnectionState::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

/// Notification delivered to the host when the predictor changes mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    Enabled,
    Disabled,
    /// Connection to the service (re)established
    Connected,
    /// Service unreachable; suggestions come from history only
    Degraded,
}

/// Point-in-time view of a session, for display
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub enabled: bool,
    pub connection: ConnectionState,
    pub history_len: usize,
    pub endpoint: String,
}
