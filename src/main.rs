#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{anyhow, Result};
use reedline::{
    default_emacs_keybindings, ColumnarMenu, Emacs, KeyCode, KeyModifiers, MenuBuilder, Prompt,
    PromptHistorySearch, PromptHistorySearchStatus, Reedline, ReedlineEvent, ReedlineMenu, Signal,
};
use rush_predict::completion::PredictionCompleter;
use rush_predict::config::PredictionSettings;
use rush_predict::logging::init_logging;
use rush_predict::predictor::{PredictionContext, PredictionSession, StatusEvent};
use std::borrow::Cow;
use std::env;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// Command-line overrides applied on top of .rushrc and the environment
#[derive(Default)]
struct Options {
    enable: bool,
    endpoint: Option<String>,
    history: Option<PathBuf>,
    suggest: Option<String>,
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let options = match parse_args(&args) {
        Ok(Some(options)) => options,
        Ok(None) => {
            print_help();
            return Ok(());
        }
        Err(e) => {
            eprintln!("rush-predict: {}", e);
            print_help();
            process::exit(2);
        }
    };

    init_logging();

    let mut settings = PredictionSettings::load()?;
    if options.enable {
        settings.is_enabled = true;
    }
    if let Some(endpoint) = options.endpoint {
        settings.endpoint = endpoint;
    }
    if let Some(history) = options.history {
        settings.history_file_path = history;
    }

    let session = Arc::new(PredictionSession::new_with_listener(settings, print_status));

    let result = if let Some(input) = options.suggest {
        print_suggestions(&session, &input);
        Ok(())
    } else if atty::is(atty::Stream::Stdin) {
        run_interactive(Arc::clone(&session))
    } else {
        run_piped(&session)
    };

    session.shutdown();
    result
}

fn parse_args(args: &[String]) -> Result<Option<Options>> {
    let mut options = Options::default();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => return Ok(None),
            "--enable" => options.enable = true,
            "--endpoint" => {
                i += 1;
                let value = args.get(i).ok_or_else(|| anyhow!("--endpoint needs a URL"))?;
                options.endpoint = Some(value.clone());
            }
            "--history" => {
                i += 1;
                let value = args.get(i).ok_or_else(|| anyhow!("--history needs a path"))?;
                options.history = Some(PathBuf::from(value));
            }
            "--suggest" => {
                i += 1;
                let value = args.get(i).ok_or_else(|| anyhow!("--suggest needs input text"))?;
                options.suggest = Some(value.clone());
                options.enable = true;
            }
            other => return Err(anyhow!("unknown option '{}'", other)),
        }
        i += 1;
    }
    Ok(Some(options))
}

fn print_help() {
    println!("rush-predict - command prediction for the Rush shell");
    println!();
    println!("USAGE:");
    println!("    rush-predict [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --enable             Turn predictions on regardless of .rushrc");
    println!("    --endpoint <URL>     Prediction service (default ws://localhost:8000/ws)");
    println!("    --history <PATH>     History file location");
    println!("    --suggest <TEXT>     Print suggestions for TEXT and exit");
    println!("    -h, --help           Show this help");
    println!();
    println!("Interactive mode runs each line with sh and records it. Press Tab for");
    println!("suggestions. Meta commands: :enable :disable :status :history :quit");
    println!();
    println!("Piped mode prints suggestions for every line read from stdin.");
}

fn print_status(event: StatusEvent) {
    match event {
        StatusEvent::Enabled => eprintln!("Command prediction enabled"),
        StatusEvent::Disabled => eprintln!("Command prediction disabled"),
        StatusEvent::Degraded => eprintln!("Prediction service unavailable, using history"),
        StatusEvent::Connected => {}
    }
}

fn print_suggestions(session: &PredictionSession, input: &str) {
    let context = PredictionContext::new(input, input.len());
    for suggestion in session.get_suggestions(&context) {
        println!(
            "{}\t{}\t{}",
            suggestion.source(),
            suggestion.command(),
            suggestion.description()
        );
    }
}

fn run_piped(session: &PredictionSession) -> Result<()> {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        print_suggestions(session, &line);
        println!();
    }
    Ok(())
}

/// Prompt showing whether predictions are live
struct PredictPrompt {
    session: Arc<PredictionSession>,
}

impl Prompt for PredictPrompt {
    fn render_prompt_left(&self) -> Cow<str> {
        let cwd = env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "?".to_string());
        Cow::Owned(cwd)
    }

    fn render_prompt_right(&self) -> Cow<str> {
        if self.session.is_enabled() {
            Cow::Borrowed("predict:on")
        } else {
            Cow::Borrowed("predict:off")
        }
    }

    fn render_prompt_indicator(&self, _prompt_mode: reedline::PromptEditMode) -> Cow<str> {
        Cow::Borrowed("> ")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<str> {
        Cow::Borrowed("> ")
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<str> {
        let prefix = match history_search.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "failing ",
        };

        Cow::Owned(format!(
            "({}reverse-search: {}) ",
            prefix, history_search.term
        ))
    }
}

fn run_interactive(session: Arc<PredictionSession>) -> Result<()> {
    let completer = Box::new(PredictionCompleter::new(Arc::clone(&session)));
    let completion_menu = Box::new(ColumnarMenu::default().with_name("completion_menu"));

    let mut keybindings = default_emacs_keybindings();
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Tab,
        ReedlineEvent::UntilFound(vec![
            ReedlineEvent::Menu("completion_menu".to_string()),
            ReedlineEvent::MenuNext,
        ]),
    );

    let mut line_editor = Reedline::create()
        .with_completer(completer)
        .with_menu(ReedlineMenu::EngineCompleter(completion_menu))
        .with_edit_mode(Box::new(Emacs::new(keybindings)));
    let prompt = PredictPrompt {
        session: Arc::clone(&session),
    };

    loop {
        match line_editor.read_line(&prompt) {
            Ok(Signal::Success(buffer)) => {
                let line = buffer.trim();
                if line.is_empty() {
                    continue;
                }

                match line {
                    ":quit" | "exit" => break,
                    ":enable" => session.enable(),
                    ":disable" => session.disable(),
                    ":status" => {
                        let status = session.status();
                        println!("enabled:    {}", status.enabled);
                        println!("connection: {} ({})", status.connection, status.endpoint);
                        println!("history:    {} commands", status.history_len);
                    }
                    ":history" => {
                        for (i, command) in session.history().iter().enumerate() {
                            println!("{:5}  {}", i + 1, command);
                        }
                    }
                    _ => {
                        run_command(line);
                        let cwd = env::current_dir().ok().map(|p| p.display().to_string());
                        session.record_command_with_context(line, cwd);
                    }
                }
            }
            Ok(Signal::CtrlC) => continue,
            Ok(Signal::CtrlD) => break,
            Err(e) => return Err(anyhow!("line editor error: {}", e)),
        }
    }

    Ok(())
}

/// Run a line with sh; `cd` is handled here so it affects this process
fn run_command(line: &str) {
    if line == "cd" || line.starts_with("cd ") {
        let target = line[2..].trim();
        let dir = if target.is_empty() || target == "~" {
            dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
        } else if let Some(rest) = target.strip_prefix("~/") {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(rest)
        } else {
            PathBuf::from(target)
        };
        if let Err(e) = env::set_current_dir(&dir) {
            eprintln!("cd: {}: {}", dir.display(), e);
        }
        return;
    }

    match process::Command::new("sh").arg("-c").arg(line).status() {
        Ok(status) if !status.success() => {
            if let Some(code) = status.code() {
                eprintln!("[exit {}]", code);
            }
        }
        Ok(_) => {}
        Err(e) => eprintln!("Failed to execute command: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("rush-predict")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_args_overrides() {
        let options = parse_args(&args(&["--endpoint", "ws://127.0.0.1:9/ws", "--history", "/tmp/h.json"]))
            .unwrap()
            .unwrap();
        assert_eq!(options.endpoint.as_deref(), Some("ws://127.0.0.1:9/ws"));
        assert_eq!(options.history, Some(PathBuf::from("/tmp/h.json")));
        assert!(!options.enable);
    }

    #[test]
    fn test_suggest_implies_enable() {
        let options = parse_args(&args(&["--suggest", "git"])).unwrap().unwrap();
        assert!(options.enable);
        assert_eq!(options.suggest.as_deref(), Some("git"));
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(&args(&["--endpoint"])).is_err());
        assert!(parse_args(&args(&["--bogus"])).is_err());
        assert!(parse_args(&args(&["--help"])).unwrap().is_none());
    }
}
