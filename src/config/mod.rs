//! Predictor settings parsed from .rushrc
//!
//! Recognised keys (shell assignment syntax, `export` optional):
//! - RUSH_PREDICT_ENABLED (true/false, 1/0, on/off, yes/no)
//! - RUSH_PREDICT_COUNT (suggestions returned per query)
//! - RUSH_PREDICT_MAX_DUPLICATE (reserved duplicate-frequency limit)
//! - RUSH_PREDICT_HISTORY (history file path, `~/` expanded)
//! - RUSH_PREDICT_ENDPOINT (ws:// URL of the prediction service)
//! - RUSH_PREDICT_CONNECT_TIMEOUT_MS
//! - RUSH_PREDICT_TIMEOUT_MS (whole predict round trip)
//! - RUSH_PREDICT_SEND_TIMEOUT_MS
//! - RUSH_PREDICT_RECONNECT_SECS (0 disables reconnection)
//!
//! Environment variables with the same names override the file.

use crate::error::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000/ws";
pub const DEFAULT_SUGGESTION_COUNT: usize = 5;
pub const DEFAULT_MAX_DUPLICATE: usize = 3;
const HISTORY_FILE_NAME: &str = "predictor_history.json";

const ALL_KEYS: &[&str] = &[
    "RUSH_PREDICT_ENABLED",
    "RUSH_PREDICT_COUNT",
    "RUSH_PREDICT_MAX_DUPLICATE",
    "RUSH_PREDICT_HISTORY",
    "RUSH_PREDICT_ENDPOINT",
    "RUSH_PREDICT_CONNECT_TIMEOUT_MS",
    "RUSH_PREDICT_TIMEOUT_MS",
    "RUSH_PREDICT_SEND_TIMEOUT_MS",
    "RUSH_PREDICT_RECONNECT_SECS",
];

/// Process-wide predictor settings
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionSettings {
    /// Master switch; disabled sessions return no suggestions
    pub is_enabled: bool,
    /// Upper bound on suggestions returned per query
    pub suggestion_count: usize,
    /// Reserved for a duplicate-frequency policy; stored but not enforced
    pub max_allowed_command_duplicate: usize,
    /// JSON file mirroring the command history
    pub history_file_path: PathBuf,
    /// Prediction service URL
    pub endpoint: String,
    /// Bound on TCP connect plus WebSocket handshake
    pub connect_timeout: Duration,
    /// Bound on one predict send/receive round trip
    pub request_timeout: Duration,
    /// Bound on fire-and-forget sends, including waiting for the connection
    pub send_timeout: Duration,
    /// Minimum spacing between reconnect attempts; `None` never reconnects
    pub reconnect_interval: Option<Duration>,
}

impl Default for PredictionSettings {
    fn default() -> Self {
        Self {
            is_enabled: false,
            suggestion_count: DEFAULT_SUGGESTION_COUNT,
            max_allowed_command_duplicate: DEFAULT_MAX_DUPLICATE,
            history_file_path: default_history_path(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(2),
            send_timeout: Duration::from_secs(1),
            reconnect_interval: Some(Duration::from_secs(30)),
        }
    }
}

impl PredictionSettings {
    /// Load settings from ~/.rushrc, then apply environment overrides
    ///
    /// A missing file means defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let rushrc = Self::rushrc_path();
        let mut settings = if rushrc.exists() {
            Self::from_file(&rushrc)?
        } else {
            Self::default()
        };
        settings.apply_env();
        Ok(settings)
    }

    /// Get the path to .rushrc
    pub fn rushrc_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".rushrc")
    }

    /// Parse settings from a specific file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&content))
    }

    /// Parse settings from content string
    ///
    /// Unknown keys belong to the rest of .rushrc and are skipped silently.
    pub fn parse(content: &str) -> Self {
        let mut settings = Self::default();

        for line in content.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let line = line.strip_prefix("export ").unwrap_or(line);

            if let Some((key, value)) = parse_assignment(line) {
                settings.apply(&key, &unquote(&value));
            }
        }

        settings
    }

    /// Override settings from process environment variables
    pub fn apply_env(&mut self) {
        for key in ALL_KEYS {
            if let Ok(value) = std::env::var(key) {
                self.apply(key, &value);
            }
        }
    }

    /// Apply a single key; invalid values keep the current setting
    fn apply(&mut self, key: &str, value: &str) {
        match key {
            "RUSH_PREDICT_ENABLED" => match parse_bool(value) {
                Some(enabled) => self.is_enabled = enabled,
                None => invalid(key, value),
            },
            "RUSH_PREDICT_COUNT" => match value.parse::<usize>() {
                Ok(count) if count > 0 => self.suggestion_count = count,
                _ => invalid(key, value),
            },
            "RUSH_PREDICT_MAX_DUPLICATE" => match value.parse::<usize>() {
                Ok(max) => self.max_allowed_command_duplicate = max,
                Err(_) => invalid(key, value),
            },
            "RUSH_PREDICT_HISTORY" => {
                if value.is_empty() {
                    invalid(key, value);
                } else {
                    self.history_file_path = expand_home(value);
                }
            }
            "RUSH_PREDICT_ENDPOINT" => {
                if value.is_empty() {
                    invalid(key, value);
                } else {
                    self.endpoint = value.to_string();
                }
            }
            "RUSH_PREDICT_CONNECT_TIMEOUT_MS" => match parse_millis(value) {
                Some(timeout) => self.connect_timeout = timeout,
                None => invalid(key, value),
            },
            "RUSH_PREDICT_TIMEOUT_MS" => match parse_millis(value) {
                Some(timeout) => self.request_timeout = timeout,
                None => invalid(key, value),
            },
            "RUSH_PREDICT_SEND_TIMEOUT_MS" => match parse_millis(value) {
                Some(timeout) => self.send_timeout = timeout,
                None => invalid(key, value),
            },
            "RUSH_PREDICT_RECONNECT_SECS" => match value.parse::<u64>() {
                Ok(0) => self.reconnect_interval = None,
                Ok(secs) => self.reconnect_interval = Some(Duration::from_secs(secs)),
                Err(_) => invalid(key, value),
            },
            _ => {}
        }
    }
}

/// Default history location under the per-user data directory
pub fn default_history_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("rush"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(HISTORY_FILE_NAME)
}

fn invalid(key: &str, value: &str) {
    warn!("ignoring invalid value for {}: {:?}", key, value);
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Zero timeouts would make every socket call fail immediately
fn parse_millis(value: &str) -> Option<Duration> {
    match value.parse::<u64>() {
        Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
        _ => None,
    }
}

fn expand_home(value: &str) -> PathBuf {
    if let Some(rest) = value.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(value)
}

/// Parse a shell variable assignment (KEY=value or KEY="value")
fn parse_assignment(line: &str) -> Option<(String, String)> {
    let eq_pos = line.find('=')?;
    let key = line[..eq_pos].trim().to_string();
    let value = line[eq_pos + 1..].trim().to_string();

    if key.is_empty() || !key.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }

    Some((key, value))
}

/// Remove surrounding quotes from a value
fn unquote(s: &str) -> String {
    let s = s.trim();

    if s.starts_with('"') && s.ends_with('"') && s.len() >= 2 {
        return s[1..s.len() - 1].to_string();
    }

    if s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2 {
        return s[1..s.len() - 1].to_string();
    }

    s.to_string()
}
