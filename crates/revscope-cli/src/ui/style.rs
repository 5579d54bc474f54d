//! Message styling for CLI output.
//!
//! | Prefix | Meaning | Color |
//! |--------|---------|-------|
//! | `[ok]` | Success | Green |
//! | `[err]` | Error | Red |
//! | `[warn]` | Warning | Yellow |
//! | `[info]` | Information | Blue |
//! | `[hint]` | Suggestion | Cyan |

use owo_colors::OwoColorize;

use super::color::ColorMode;

/// Message severity for CLI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Ok,
    Err,
    Warn,
    Info,
    Hint,
}

impl MessageType {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Ok => "[ok]",
            Self::Err => "[err]",
            Self::Warn => "[warn]",
            Self::Info => "[info]",
            Self::Hint => "[hint]",
        }
    }
}

/// Styling interface for CLI output.
///
/// # Example
///
/// ```ignore
/// let style = Style::new(ColorMode::Never);
/// eprintln!("{}", style.message(MessageType::Warn, "Session root missing"));
/// ```
#[derive(Debug, Clone)]
pub struct Style {
    color_mode: ColorMode,
}

impl Style {
    pub fn new(color_mode: ColorMode) -> Self {
        Self { color_mode }
    }

    pub fn colors_enabled(&self) -> bool {
        self.color_mode.is_enabled()
    }

    /// `[prefix] text`, with the prefix colored by type.
    pub fn message(&self, msg_type: MessageType, text: &str) -> String {
        let prefix = msg_type.prefix();
        if !self.colors_enabled() {
            return format!("{} {}", prefix, text);
        }
        let colored = match msg_type {
            MessageType::Ok => prefix.green().to_string(),
            MessageType::Err => prefix.red().to_string(),
            MessageType::Warn => prefix.yellow().to_string(),
            MessageType::Info => prefix.blue().to_string(),
            MessageType::Hint => prefix.cyan().to_string(),
        };
        format!("{} {}", colored, text)
    }

    /// An error line followed by optional indented cause and hint lines.
    pub fn error_with_context(&self, msg: &str, cause: Option<&str>, hint: Option<&str>) -> String {
        let mut output = self.message(MessageType::Err, msg);
        if let Some(cause) = cause {
            output.push_str(&format!("\n      Cause: {}", cause));
        }
        if let Some(hint) = hint {
            output.push_str(&format!("\n      Hint: {}", hint));
        }
        output
    }

    pub fn section(&self, title: &str) -> String {
        if self.colors_enabled() {
            title.bold().to_string()
        } else {
            title.to_string()
        }
    }

    pub fn key_value(&self, key: &str, value: &str) -> String {
        if self.colors_enabled() {
            format!("{}: {}", key.dimmed(), value)
        } else {
            format!("{}: {}", key, value)
        }
    }

    /// A path, cyan.
    pub fn path(&self, path: &str) -> String {
        if self.colors_enabled() {
            path.cyan().to_string()
        } else {
            path.to_string()
        }
    }

    /// A session status, green for `ready`, red for `error`, yellow otherwise.
    pub fn status(&self, status: &str) -> String {
        if !self.colors_enabled() {
            return status.to_string();
        }
        match status {
            "ready" => status.green().to_string(),
            "error" => status.red().to_string(),
            "-" => status.dimmed().to_string(),
            _ => status.yellow().to_string(),
        }
    }
}
