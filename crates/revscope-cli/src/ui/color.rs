//! Color mode detection.
//!
//! Respects `NO_COLOR` (https://no-color.org/). Colors are decided against
//! stderr as well as stdout since most styled output goes to stderr.

use std::io::IsTerminal;

/// Color output mode for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    /// Always use colors, even when output is not a TTY.
    Always,
    /// Never use colors.
    Never,
    /// Colors when attached to a terminal and `NO_COLOR` is unset.
    #[default]
    Auto,
}

impl ColorMode {
    /// Parse a `--color` flag value (`always`, `never`, `auto`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "always" => Some(Self::Always),
            "never" => Some(Self::Never),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => Self::should_auto_colorize(),
        }
    }

    fn should_auto_colorize() -> bool {
        if std::env::var_os("NO_COLOR").is_some() {
            return false;
        }
        std::io::stdout().is_terminal() && std::io::stderr().is_terminal()
    }
}

/// Current terminal width, or 100 when it cannot be determined.
pub fn terminal_width() -> u16 {
    terminal_size::terminal_size()
        .map(|(w, _)| w.0)
        .unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(ColorMode::parse("always"), Some(ColorMode::Always));
        assert_eq!(ColorMode::parse("NEVER"), Some(ColorMode::Never));
        assert_eq!(ColorMode::parse(" auto "), Some(ColorMode::Auto));
        assert_eq!(ColorMode::parse("sometimes"), None);
    }

    #[test]
    fn test_explicit_modes() {
        assert!(ColorMode::Always.is_enabled());
        assert!(!ColorMode::Never.is_enabled());
    }
}
