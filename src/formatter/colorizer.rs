//! Color output support for terminal formatting
//!
//! Wraps `nu_ansi_term` styles behind a switch so every caller can ignore
//! whether color is on.

use nu_ansi_term::{Color, Style};

/// Color scheme for console messages
#[derive(Debug, Clone, Copy)]
pub struct Colorizer {
    /// Enable colors
    enabled: bool,
}

impl Colorizer {
    /// Create a new colorizer
    ///
    /// # Arguments
    /// * `enabled` - Enable color output
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn paint(&self, style: Style, text: &str) -> String {
        if self.enabled {
            style.paint(text).to_string()
        } else {
            text.to_string()
        }
    }

    /// Colorize text as success (green)
    pub fn success(&self, text: &str) -> String {
        self.paint(Color::Green.bold(), text)
    }

    /// Colorize text as error (red), prefixed with `Error: `
    pub fn error(&self, text: &str) -> String {
        self.paint(Color::Red.normal(), &format!("Error: {text}"))
    }

    /// Colorize text as warning (yellow)
    pub fn warning(&self, text: &str) -> String {
        self.paint(Color::Yellow.normal(), text)
    }

    /// Colorize text as info (blue)
    pub fn info(&self, text: &str) -> String {
        self.paint(Color::Blue.normal(), text)
    }

    /// Colorize a highlighted value (cyan)
    pub fn value(&self, text: &str) -> String {
        self.paint(Color::Cyan.normal(), text)
    }

    /// Dim secondary text
    pub fn dim(&self, text: &str) -> String {
        self.paint(Style::new().dimmed(), text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_is_plain() {
        let c = Colorizer::new(false);
        assert_eq!(c.success("ok"), "ok");
        assert_eq!(c.error("boom"), "Error: boom");
        assert_eq!(c.value("42"), "42");
    }

    #[test]
    fn test_enabled_adds_escapes() {
        let c = Colorizer::new(true);
        let painted = c.success("ok");
        assert!(painted.contains("ok"));
        assert!(painted.starts_with('\x1b'));
        assert!(painted.ends_with("\x1b[0m"));
    }
}
