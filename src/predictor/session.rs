//! Prediction session: the contract the host line editor talks to
//!
//! Ties together the history store and the service protocol:
//! - `get_suggestions`: service predictions when reachable, history prefix
//!   matches otherwise
//! - `record_command`: history update plus a best-effort report to the service
//! - `enable` / `disable`: the master switch
//!
//! Nothing here returns an error to the host. Service problems are logged
//! and answered from history.

use crate::config::PredictionSettings;
use crate::error::{ProtocolError, TransportError};
use crate::history::HistoryStore;
use crate::predictor::protocol::PredictionProtocol;
use crate::predictor::transport::PredictionTransport;
use crate::predictor::types::{
    CommandSuggestion, ConnectionState, Prediction, PredictionContext, SessionStatus, StatusEvent,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::RwLock;
use std::time::Instant;
use tracing::{debug, info, warn};

type StatusListener = Box<dyn Fn(StatusEvent) + Send + Sync>;

pub struct PredictionSession {
    settings: RwLock<PredictionSettings>,
    history: RwLock<HistoryStore>,
    protocol: PredictionProtocol,
    last_connect_attempt: Mutex<Option<Instant>>,
    listener: Option<StatusListener>,
}

impl PredictionSession {
    /// Build a session from settings and make one connection attempt
    ///
    /// History is loaded from `settings.history_file_path`. A failed connect
    /// leaves the session answering from history.
    pub fn new(settings: PredictionSettings) -> Self {
        let history = HistoryStore::open(&settings.history_file_path);
        let session = Self::with_history(settings, history);
        session.connect();
        session
    }

    /// Like [`PredictionSession::new`], with `listener` registered before the
    /// connection attempt so it sees the initial `Connected` or `Degraded`
    pub fn new_with_listener<F>(settings: PredictionSettings, listener: F) -> Self
    where
        F: Fn(StatusEvent) + Send + Sync + 'static,
    {
        let history = HistoryStore::open(&settings.history_file_path);
        let session = Self::with_history(settings, history).with_status_listener(listener);
        session.connect();
        session
    }

    /// Build a session around an existing store without connecting
    pub fn with_history(settings: PredictionSettings, history: HistoryStore) -> Self {
        let transport = PredictionTransport::new(settings.endpoint.clone())
            .with_connect_timeout(settings.connect_timeout)
            .with_send_timeout(settings.send_timeout)
            .with_receive_timeout(settings.request_timeout);
        let protocol = PredictionProtocol::new(transport)
            .with_request_timeout(settings.request_timeout)
            .with_send_timeout(settings.send_timeout);

        Self {
            settings: RwLock::new(settings),
            history: RwLock::new(history),
            protocol,
            last_connect_attempt: Mutex::new(None),
            listener: None,
        }
    }

    /// Register a callback for mode changes
    pub fn with_status_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(StatusEvent) + Send + Sync + 'static,
    {
        self.listener = Some(Box::new(listener));
        self
    }

    /// Try to (re)connect to the service once
    ///
    /// Returns whether the session is connected afterwards.
    pub fn connect(&self) -> bool {
        *self.last_connect_attempt.lock() = Some(Instant::now());

        match self.protocol.connect() {
            Ok(()) => {
                info!(endpoint = %self.protocol.endpoint(), "prediction service connected");
                self.notify(StatusEvent::Connected);
                true
            }
            Err(e) => {
                warn!("{}; using history-only suggestions", e);
                self.notify(StatusEvent::Degraded);
                false
            }
        }
    }

    /// Suggestions for the current input line, best first
    ///
    /// Empty when disabled. At most `suggestion_count` entries.
    pub fn get_suggestions(&self, context: &PredictionContext) -> Vec<CommandSuggestion> {
        let (enabled, limit) = match self.settings.read() {
            Ok(settings) => (settings.is_enabled, settings.suggestion_count),
            Err(_) => {
                warn!("settings lock poisoned, returning no suggestions");
                return Vec::new();
            }
        };
        if !enabled {
            return Vec::new();
        }

        let input = context.input_text.trim();
        let snapshot = match self.history.read() {
            Ok(history) => history.snapshot(),
            Err(_) => {
                warn!("history lock poisoned, returning no suggestions");
                return Vec::new();
            }
        };

        let mut suggestions = match self.predict(input, &snapshot) {
            Ok(predictions) => shape_predictions(predictions),
            Err(e) => {
                debug!("falling back to history: {}", e);
                self.fallback(input)
            }
        };
        suggestions.truncate(limit);
        suggestions
    }

    fn predict(&self, input: &str, history: &[String]) -> Result<Vec<Prediction>, ProtocolError> {
        match self.protocol.request_predictions(input, history) {
            Err(ProtocolError::Transport(TransportError::NotConnected)) if self.reconnect_due() => {
                debug!("reconnecting to prediction service");
                if self.connect() {
                    self.protocol.request_predictions(input, history)
                } else {
                    Err(TransportError::NotConnected.into())
                }
            }
            result => result,
        }
    }

    fn reconnect_due(&self) -> bool {
        let interval = match self.settings.read() {
            Ok(settings) => settings.reconnect_interval,
            Err(_) => None,
        };
        let Some(interval) = interval else {
            return false;
        };
        match *self.last_connect_attempt.lock() {
            Some(last) => last.elapsed() >= interval,
            None => true,
        }
    }

    /// History entries starting with `input` (case-insensitive), stored order
    fn fallback(&self, input: &str) -> Vec<CommandSuggestion> {
        match self.history.read() {
            Ok(history) => history
                .prefix_matches(input)
                .into_iter()
                .map(CommandSuggestion::from_history)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Record an executed command
    ///
    /// New commands are also reported to the service. Returns whether the
    /// history changed.
    pub fn record_command(&self, command: &str) -> bool {
        self.record_command_with_context(command, None)
    }

    /// Record an executed command with free-form context (e.g. the cwd)
    pub fn record_command_with_context(&self, command: &str, context: Option<String>) -> bool {
        let added = match self.history.write() {
            Ok(mut history) => history.add(command),
            Err(_) => {
                warn!("history lock poisoned, command not recorded");
                return false;
            }
        };

        if added {
            match self.protocol.record_command(command, context) {
                Ok(()) => {}
                Err(ProtocolError::Transport(TransportError::Timeout)) => {
                    warn!("connection busy, record for '{}' dropped", command);
                }
                Err(e) => debug!("record not sent to prediction service: {}", e),
            }
        }
        added
    }

    pub fn enable(&self) {
        self.set_enabled(true);
    }

    pub fn disable(&self) {
        self.set_enabled(false);
    }

    fn set_enabled(&self, enabled: bool) {
        match self.settings.write() {
            Ok(mut settings) => settings.is_enabled = enabled,
            Err(_) => {
                warn!("settings lock poisoned, predictor state unchanged");
                return;
            }
        }
        if enabled {
            info!("command prediction enabled");
            self.notify(StatusEvent::Enabled);
        } else {
            info!("command prediction disabled");
            self.notify(StatusEvent::Disabled);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.read().map(|s| s.is_enabled).unwrap_or(false)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.protocol.state()
    }

    /// Copy of the current history, oldest first
    pub fn history(&self) -> Vec<String> {
        self.history.read().map(|h| h.snapshot()).unwrap_or_default()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            enabled: self.is_enabled(),
            connection: self.protocol.state(),
            history_len: self.history.read().map(|h| h.len()).unwrap_or(0),
            endpoint: self.protocol.endpoint(),
        }
    }

    /// Close the service connection
    pub fn shutdown(&self) {
        self.protocol.close();
    }

    fn notify(&self, event: StatusEvent) {
        if let Some(listener) = &self.listener {
            listener(event);
        }
    }
}

/// Map service predictions to suggestions, keeping the first of any duplicates
fn shape_predictions(predictions: Vec<Prediction>) -> Vec<CommandSuggestion> {
    let mut seen = HashSet::new();
    predictions
        .into_iter()
        .filter(|p| seen.insert(p.command.clone()))
        .map(|p| CommandSuggestion::from_prediction(p.command, p.score))
        .collect()
}
