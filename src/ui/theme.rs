//! Visual theme and styling.

use console::Style;

use crate::flow::{RecordEntry, StepStatus};

/// Stepflow's visual theme.
#[derive(Debug, Clone)]
pub struct StepflowTheme {
    /// Style for success messages (green).
    pub success: Style,
    /// Style for warning messages (orange).
    pub warning: Style,
    /// Style for error messages (red bold).
    pub error: Style,
    /// Style for running elements and signals (magenta).
    pub info: Style,
    /// Style for dim/secondary text.
    pub dim: Style,
    /// Style for highlighted text (bold).
    pub highlight: Style,
    /// Style for headers (magenta bold).
    pub header: Style,
    /// Style for durations (dim).
    pub duration: Style,
    /// Style for key labels in key-value displays (bold).
    pub key: Style,
}

impl Default for StepflowTheme {
    fn default() -> Self {
        Self::new()
    }
}

impl StepflowTheme {
    /// Create the colored theme.
    pub fn new() -> Self {
        Self {
            success: Style::new().green(),
            warning: Style::new().color256(208),
            error: Style::new().red().bold(),
            info: Style::new().magenta(),
            dim: Style::new().dim(),
            highlight: Style::new().bold(),
            header: Style::new().bold().magenta(),
            duration: Style::new().dim(),
            key: Style::new().bold(),
        }
    }

    /// Create a theme without colors (for non-TTY or --no-color).
    pub fn plain() -> Self {
        Self {
            success: Style::new(),
            warning: Style::new(),
            error: Style::new(),
            info: Style::new(),
            dim: Style::new(),
            highlight: Style::new(),
            header: Style::new(),
            duration: Style::new(),
            key: Style::new(),
        }
    }

    /// Pick the colored or plain theme.
    pub fn for_colors(colors: bool) -> Self {
        if colors {
            Self::new()
        } else {
            Self::plain()
        }
    }

    /// Format a success message.
    pub fn format_success(&self, msg: &str) -> String {
        format!("{}", self.success.apply_to(format!("✓ {}", msg)))
    }

    /// Format a warning message.
    pub fn format_warning(&self, msg: &str) -> String {
        format!("{}", self.warning.apply_to(format!("⚠ {}", msg)))
    }

    /// Format an error message.
    pub fn format_error(&self, msg: &str) -> String {
        format!("{}", self.error.apply_to(format!("✗ {}", msg)))
    }

    /// Format a skipped message.
    pub fn format_skipped(&self, msg: &str) -> String {
        format!("{}", self.dim.apply_to(format!("○ {}", msg)))
    }

    /// Format a header banner.
    pub fn format_header(&self, title: &str) -> String {
        format!(
            "{} {}",
            self.header.apply_to("◆"),
            self.highlight.apply_to(title)
        )
    }

    /// Format a `key: value` line.
    pub fn format_field(&self, key: &str, value: &str) -> String {
        format!("  {} {}", self.key.apply_to(format!("{}:", key)), value)
    }

    /// Format one record entry: status, name, signal, error and duration.
    pub fn format_entry(&self, entry: &RecordEntry) -> String {
        let style = match entry.status {
            StepStatus::Completed => &self.success,
            StepStatus::Failed => &self.error,
            StepStatus::TimedOut => &self.warning,
        };
        let mut line = format!(
            "  {} {}",
            style.apply_to(entry.status.display_char()),
            self.highlight.apply_to(&entry.step)
        );
        if let Some(signal) = &entry.signal {
            line.push_str(&format!(" {}", self.info.apply_to(format!("→ {}", signal))));
        }
        line.push_str(&format!(
            " {}",
            self.duration
                .apply_to(super::format_duration(entry.duration()))
        ));
        if let Some(error) = &entry.error {
            line.push_str(&format!(" {}", self.error.apply_to(error)));
        }
        line
    }
}

/// Check if colors should be enabled.
pub fn should_use_colors() -> bool {
    // https://no-color.org/
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    console::Term::stdout().is_term()
}
