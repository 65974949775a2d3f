use logmill_core::config::ConsoleConfig;
use logmill_core::{Level, OutputError};
use std::io::{self, Write};

const RESET: &str = "\x1b[0m";

/// Mirrors encoded lines to a console writer (stdout by default)
pub struct ConsoleMirror {
    color: bool,
    out: Box<dyn Write + Send>,
}

impl ConsoleMirror {
    /// Mirror to stdout
    pub fn stdout(color: bool) -> Self {
        Self::with_writer(color, Box::new(io::stdout()))
    }

    /// Mirror to stdout when enabled in `config`
    pub fn from_config(config: &ConsoleConfig) -> Option<Self> {
        config.enabled.then(|| Self::stdout(config.color))
    }

    /// Mirror to any writer
    pub fn with_writer(color: bool, out: Box<dyn Write + Send>) -> Self {
        Self { color, out }
    }

    /// Write one already newline-terminated line
    pub fn write(&mut self, level: Level, line: &str) -> Result<(), OutputError> {
        let output = self.format_line(level, line);
        self.out
            .write_all(output.as_bytes())
            .and_then(|_| self.out.flush())
            .map_err(|e| OutputError::Console(e.to_string()))
    }

    /// The line as printed, with the level tag when coloring is on
    fn format_line(&self, level: Level, line: &str) -> String {
        if self.color {
            format!("{} {}", level_tag(level), line)
        } else {
            line.to_string()
        }
    }
}

/// Bracketed, colored, fixed-width level tag
fn level_tag(level: Level) -> String {
    let (color, label) = match level {
        Level::Debug => ("\x1b[36m", "[DEBUG]"),
        Level::Info => ("\x1b[32m", "[INFO ]"),
        Level::Warn => ("\x1b[33m", "[WARN ]"),
        Level::Error => ("\x1b[31m", "[ERROR]"),
    };
    format!("{}{}{}", color, label, RESET)
}
