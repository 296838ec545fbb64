//! Terminal styling for aztf-backup
//!
//! Plain functions that render one styled line each to the given stream.
//! Level filtering lives in `TerminalOutput`; these functions always print.

use owo_colors::OwoColorize;
use std::fmt::Display;

/// Where styled lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stream {
    #[default]
    Stdout,
    /// Everything on stderr, leaving stdout for machine-readable results
    Stderr,
}

impl Stream {
    fn line(self, text: impl Display) {
        match self {
            Stream::Stdout => println!("{}", text),
            Stream::Stderr => eprintln!("{}", text),
        }
    }
}

/// Print a success message with a green checkmark
pub fn success(stream: Stream, message: &str) {
    // Pastel mint green: RGB(152, 225, 152)
    stream.line(format_args!(
        "{} {}",
        "✓".truecolor(152, 225, 152).bold(),
        message.bright_white()
    ));
}

/// Print an error message with a red X (always stderr)
pub fn error(message: &str) {
    // Pastel coral/salmon: RGB(255, 160, 160)
    eprintln!(
        "{} {}",
        "✗".truecolor(255, 160, 160).bold(),
        message.bright_white()
    );
}

/// Print a warning message with a yellow warning symbol
pub fn warning(stream: Stream, message: &str) {
    // Pastel cream/yellow: RGB(255, 230, 160)
    stream.line(format_args!(
        "{} {}",
        "⚠".truecolor(255, 230, 160).bold(),
        message.bright_white()
    ));
}

/// Print an info message with a blue info symbol
pub fn info(stream: Stream, message: &str) {
    // Pastel sky blue: RGB(160, 200, 255)
    stream.line(format_args!(
        "{} {}",
        "ℹ".truecolor(160, 200, 255).bold(),
        message.bright_white()
    ));
}

/// Print a debug message, dimmed and tagged
pub fn debug(stream: Stream, message: &str) {
    stream.line(format_args!(
        "{} {}",
        "·".truecolor(160, 160, 160),
        message.truecolor(160, 160, 160)
    ));
}

/// Print a section header with a separator line
pub fn section(stream: Stream, title: &str) {
    // Pastel lavender: RGB(181, 174, 254)
    stream.line(format_args!("\n{}", title.truecolor(181, 174, 254).bold()));
    stream.line("─".repeat(60).truecolor(160, 160, 160));
}

/// Print a small section header without separator
pub fn subsection(stream: Stream, title: &str) {
    // Softer pastel teal: RGB(120, 180, 195)
    stream.line(format_args!("\n{}", title.truecolor(120, 180, 195)));
    stream.line("·".repeat(30).truecolor(160, 160, 160));
}

/// Print a key-value pair with styled key and value
pub fn key_value(stream: Stream, key: &str, value: &str) {
    stream.line(format_args!(
        "  {} {}",
        format!("{}:", key).truecolor(160, 160, 160),
        value.bright_white()
    ));
}

/// Print a dimmed/muted message
pub fn dimmed(stream: Stream, message: &str) {
    stream.line(message.truecolor(160, 160, 160));
}

/// Print a line exactly as received (export tool transcript)
pub fn raw(stream: Stream, line: &str) {
    stream.line(line);
}
