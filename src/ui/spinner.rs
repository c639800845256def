//! Progress spinners.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use super::theme::StepflowTheme;
use super::SpinnerHandle;

/// A progress spinner shown while a pipeline runs.
///
/// When stderr is not a terminal the bar is hidden and the finishing line
/// is echoed to stdout instead.
pub struct ProgressSpinner {
    bar: ProgressBar,
    theme: StepflowTheme,
    echo: bool,
}

impl ProgressSpinner {
    /// Create a new spinner with a message.
    pub fn new(message: &str, theme: StepflowTheme) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                .template("{spinner:.magenta} {msg}")
                .unwrap(),
        );
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));

        Self {
            bar,
            theme,
            echo: false,
        }
    }

    /// Create a spinner for a non-terminal stderr.
    pub fn plain(theme: StepflowTheme) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            theme,
            echo: true,
        }
    }

    /// Create a spinner that doesn't show (for silent mode).
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            theme: StepflowTheme::plain(),
            echo: false,
        }
    }

    fn finish_with(&mut self, line: String) {
        if self.echo {
            println!("{}", line);
            self.bar.finish();
            return;
        }
        self.bar
            .set_style(ProgressStyle::default_spinner().template("{msg}").unwrap());
        self.bar.finish_with_message(line);
    }
}

impl SpinnerHandle for ProgressSpinner {
    fn set_message(&mut self, msg: &str) {
        self.bar.set_message(msg.to_string());
    }

    fn println(&mut self, line: &str) {
        self.bar.suspend(|| println!("{}", line));
    }

    fn finish_success(&mut self, msg: &str) {
        let line = self.theme.format_success(msg);
        self.finish_with(line);
    }

    fn finish_error(&mut self, msg: &str) {
        let line = self.theme.format_error(msg);
        self.finish_with(line);
    }

    fn finish_skipped(&mut self, msg: &str) {
        let line = self.theme.format_skipped(msg);
        self.finish_with(line);
    }
}
