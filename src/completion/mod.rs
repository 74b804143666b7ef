// Line editor integration for command predictions
use crate::predictor::{CommandSuggestion, PredictionContext, PredictionSession, SuggestionSource};
use nu_ansi_term::{Color, Style};
use reedline::{Completer as ReedlineCompleter, Span, Suggestion};
use std::sync::Arc;

/// Reedline completer backed by a shared prediction session
///
/// Each suggestion replaces the whole input line.
pub struct PredictionCompleter {
    session: Arc<PredictionSession>,
}

impl PredictionCompleter {
    pub fn new(session: Arc<PredictionSession>) -> Self {
        Self { session }
    }

    fn to_suggestion(suggestion: CommandSuggestion, span: Span) -> Suggestion {
        let style = match suggestion.source() {
            SuggestionSource::AI => Style::new().fg(Color::Cyan),
            SuggestionSource::History => Style::new().fg(Color::DarkGray),
            SuggestionSource::Default => Style::new(),
        };

        Suggestion {
            value: suggestion.command().to_string(),
            description: Some(suggestion.description().to_string()),
            style: Some(style),
            extra: None,
            span,
            append_whitespace: false,
        }
    }
}

impl ReedlineCompleter for PredictionCompleter {
    fn complete(&mut self, line: &str, pos: usize) -> Vec<Suggestion> {
        let pos = pos.min(line.len());
        let tokens = line
            .get(..pos)
            .unwrap_or(line)
            .split_whitespace()
            .map(String::from)
            .collect();
        let context = PredictionContext::new(line, pos).with_tokens(tokens);

        let span = Span::new(0, line.len());
        self.session
            .get_suggestions(&context)
            .into_iter()
            .map(|s| Self::to_suggestion(s, span))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PredictionSettings;
    use crate::history::HistoryStore;

    fn setup_completer(enabled: bool, commands: &[&str]) -> PredictionCompleter {
        let settings = PredictionSettings {
            is_enabled: enabled,
            reconnect_interval: None,
            ..PredictionSettings::default()
        };
        let mut history = HistoryStore::new();
        for command in commands {
            history.add(command);
        }
        let session = PredictionSession::with_history(settings, history);
        PredictionCompleter::new(Arc::new(session))
    }

    #[test]
    fn test_history_completion_replaces_line() {
        let mut completer = setup_completer(true, &["cargo build", "cargo test", "ls"]);
        let suggestions = completer.complete("carg", 4);

        let values: Vec<String> = suggestions.iter().map(|s| s.value.clone()).collect();
        assert_eq!(values, vec!["cargo build", "cargo test"]);
        assert_eq!(suggestions[0].span, Span::new(0, 4));
        assert_eq!(suggestions[0].description.as_deref(), Some("From history"));
    }

    #[test]
    fn test_disabled_completer_is_empty() {
        let mut completer = setup_completer(false, &["cargo build"]);
        assert!(completer.complete("carg", 4).is_empty());
    }

    #[test]
    fn test_cursor_past_end_is_clamped() {
        let mut completer = setup_completer(true, &["echo hi"]);
        let suggestions = completer.complete("ec", 10);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].span, Span::new(0, 2));
    }
}
