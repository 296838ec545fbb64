use std::fmt;
use std::str::FromStr;

use crate::output::Stream;
#[cfg(test)]
use std::sync::Mutex;

/// Verbosity threshold for `TerminalOutput`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debug" | "trace" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" | "critical" => Ok(LogLevel::Error),
            other => Err(format!(
                "unknown log level '{}' (expected debug, info, warning or error)",
                other
            )),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// Output message captured by MockOutput for testing
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub enum OutputMessage {
    Success(String),
    Error(String),
    Warning(String),
    Info(String),
    Debug(String),
    Section(String),
    Subsection(String),
    KeyValue(String, String),
    Dimmed(String),
    Raw(String),
}

/// Logger handed to every component at construction time
pub trait Output: Send + Sync {
    /// Print a success message
    fn success(&self, message: &str);

    /// Print an error message
    fn error(&self, message: &str);

    /// Print a warning message
    fn warning(&self, message: &str);

    /// Print an info message
    fn info(&self, message: &str);

    /// Print a debug message (suppressed unless the level is debug)
    fn debug(&self, message: &str);

    /// Print a section header
    fn section(&self, title: &str);

    /// Print a subsection header
    fn subsection(&self, title: &str);

    /// Print a key-value pair
    fn key_value(&self, key: &str, value: &str);

    /// Print a dimmed/muted message
    fn dimmed(&self, message: &str);

    /// Echo a line of external tool output verbatim
    fn raw(&self, line: &str);
}

/// Real terminal output implementation using the output module
pub struct TerminalOutput {
    level: LogLevel,
    stream: Stream,
}

impl TerminalOutput {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            stream: Stream::Stdout,
        }
    }

    /// Send every message to stderr
    pub fn diagnostics_only(level: LogLevel) -> Self {
        Self {
            level,
            stream: Stream::Stderr,
        }
    }

    fn enabled(&self, level: LogLevel) -> bool {
        level >= self.level
    }
}

impl Default for TerminalOutput {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

impl Output for TerminalOutput {
    fn success(&self, message: &str) {
        if self.enabled(LogLevel::Info) {
            crate::output::success(self.stream, message);
        }
    }

    fn error(&self, message: &str) {
        crate::output::error(message);
    }

    fn warning(&self, message: &str) {
        if self.enabled(LogLevel::Warning) {
            crate::output::warning(self.stream, message);
        }
    }

    fn info(&self, message: &str) {
        if self.enabled(LogLevel::Info) {
            crate::output::info(self.stream, message);
        }
    }

    fn debug(&self, message: &str) {
        if self.enabled(LogLevel::Debug) {
            crate::output::debug(self.stream, message);
        }
    }

    fn section(&self, title: &str) {
        if self.enabled(LogLevel::Info) {
            crate::output::section(self.stream, title);
        }
    }

    fn subsection(&self, title: &str) {
        if self.enabled(LogLevel::Info) {
            crate::output::subsection(self.stream, title);
        }
    }

    fn key_value(&self, key: &str, value: &str) {
        if self.enabled(LogLevel::Info) {
            crate::output::key_value(self.stream, key, value);
        }
    }

    fn dimmed(&self, message: &str) {
        if self.enabled(LogLevel::Info) {
            crate::output::dimmed(self.stream, message);
        }
    }

    fn raw(&self, line: &str) {
        // Operators always see the live transcript, whatever the level.
        crate::output::raw(self.stream, line);
    }
}

/// Mock output implementation for testing (captures output)
#[cfg(test)]
pub struct MockOutput {
    messages: Mutex<Vec<OutputMessage>>,
}

#[cfg(test)]
impl MockOutput {
    /// Create new mock output
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Get all captured messages
    pub fn get_messages(&self) -> Vec<OutputMessage> {
        self.messages.lock().unwrap().clone()
    }

    /// Check if any error message was output
    pub fn has_error(&self) -> bool {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .any(|m| matches!(m, OutputMessage::Error(_)))
    }

    /// Get all error messages
    pub fn get_errors(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                OutputMessage::Error(msg) => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }

    /// Get all warning messages
    pub fn get_warnings(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                OutputMessage::Warning(msg) => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }

    /// Get every echoed transcript line
    pub fn get_raw(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                OutputMessage::Raw(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    /// Get all messages formatted as text
    pub fn to_text(&self) -> String {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|msg| match msg {
                OutputMessage::Success(s) => format!("✓ {}", s),
                OutputMessage::Error(s) => format!("✗ {}", s),
                OutputMessage::Warning(s) => format!("⚠ {}", s),
                OutputMessage::Info(s) => s.clone(),
                OutputMessage::Debug(s) => s.clone(),
                OutputMessage::Section(s) => format!("\n=== {} ===", s),
                OutputMessage::Subsection(s) => format!("\n--- {} ---", s),
                OutputMessage::KeyValue(k, v) => format!("{}: {}", k, v),
                OutputMessage::Dimmed(s) => s.clone(),
                OutputMessage::Raw(s) => s.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn push(&self, message: OutputMessage) {
        self.messages.lock().unwrap().push(message);
    }
}

#[cfg(test)]
impl Default for MockOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl Output for MockOutput {
    fn success(&self, message: &str) {
        self.push(OutputMessage::Success(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.push(OutputMessage::Error(message.to_string()));
    }

    fn warning(&self, message: &str) {
        self.push(OutputMessage::Warning(message.to_string()));
    }

    fn info(&self, message: &str) {
        self.push(OutputMessage::Info(message.to_string()));
    }

    fn debug(&self, message: &str) {
        self.push(OutputMessage::Debug(message.to_string()));
    }

    fn section(&self, title: &str) {
        self.push(OutputMessage::Section(title.to_string()));
    }

    fn subsection(&self, title: &str) {
        self.push(OutputMessage::Subsection(title.to_string()));
    }

    fn key_value(&self, key: &str, value: &str) {
        self.push(OutputMessage::KeyValue(key.to_string(), value.to_string()));
    }

    fn dimmed(&self, message: &str) {
        self.push(OutputMessage::Dimmed(message.to_string()));
    }

    fn raw(&self, line: &str) {
        self.push(OutputMessage::Raw(line.to_string()));
    }
}
