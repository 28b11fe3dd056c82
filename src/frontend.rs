// Front end collaborators
//
// The conversion core never touches widgets or dialogs. It talks to the
// user through these three traits; the console implementation below is what
// the command line binary plugs in.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// How serious a reported message is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Sink for user-facing errors and warnings
pub trait MessageSink: Send + Sync {
    fn report(&self, severity: Severity, text: &str);
}

/// Single-line status display
pub trait StatusSink: Send + Sync {
    fn set_status(&self, text: &str);

    /// Enable or disable the convert action
    fn set_conversion_enabled(&self, _enabled: bool) {}
}

/// Modal pickers and confirmations
pub trait Chooser: Send + Sync {
    fn choose_file(&self, title: &str) -> Option<PathBuf>;

    fn choose_folder(&self, title: &str) -> Option<PathBuf>;

    fn confirm(&self, question: &str) -> bool;
}

/// Terminal front end: status on stderr, prompts on stdin
pub struct ConsoleFrontend {
    /// Answer every confirmation with yes instead of prompting
    pub assume_yes: bool,
}

impl ConsoleFrontend {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }

    fn prompt_line(&self, prompt: &str) -> Option<String> {
        eprint!("{}: ", prompt);
        let _ = io::stderr().flush();

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    None
                } else {
                    Some(line.to_string())
                }
            }
        }
    }
}

impl MessageSink for ConsoleFrontend {
    fn report(&self, severity: Severity, text: &str) {
        match severity {
            Severity::Error => log::error!("{}", text),
            Severity::Warning => log::warn!("{}", text),
            Severity::Info => log::info!("{}", text),
        }
        eprintln!("{}", text);
    }
}

impl StatusSink for ConsoleFrontend {
    fn set_status(&self, text: &str) {
        log::debug!("status: {}", text);
        eprintln!("[Gusto] {}", text);
    }

    fn set_conversion_enabled(&self, enabled: bool) {
        log::debug!("Convert action {}", if enabled { "enabled" } else { "disabled" });
    }
}

impl Chooser for ConsoleFrontend {
    fn choose_file(&self, title: &str) -> Option<PathBuf> {
        self.prompt_line(title).map(PathBuf::from)
    }

    fn choose_folder(&self, title: &str) -> Option<PathBuf> {
        self.prompt_line(title).map(PathBuf::from)
    }

    fn confirm(&self, question: &str) -> bool {
        if self.assume_yes {
            eprintln!("{} [y/N]: y", question);
            return true;
        }
        self.prompt_line(&format!("{} [y/N]", question))
            .map(|answer| matches!(answer.to_lowercase().as_str(), "y" | "yes"))
            .unwrap_or(false)
    }
}
