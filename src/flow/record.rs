//! Execution record: the ordered log of step firings for one run.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Status of a recorded step firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step completed successfully.
    Completed,

    /// Step failed.
    Failed,

    /// Step exceeded its timeout.
    TimedOut,
}

impl StepStatus {
    /// Get a display character for this status.
    pub fn display_char(&self) -> char {
        match self {
            StepStatus::Completed => '✓',
            StepStatus::Failed => '✗',
            StepStatus::TimedOut => '⧗',
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::TimedOut => "timed out",
        };
        write!(f, "{}", s)
    }
}

/// One step firing.
#[derive(Debug, Clone, Serialize)]
pub struct RecordEntry {
    /// Step name.
    pub step: String,

    /// Resolved input value.
    pub input: Value,

    /// Produced output (None if the step failed).
    pub output: Option<Value>,

    /// Signal emitted, for router steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,

    /// When the step started.
    pub started_at: DateTime<Utc>,

    /// When the step finished.
    pub finished_at: DateTime<Utc>,

    /// Final status.
    pub status: StepStatus,

    /// Error message with its cause chain (if failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecordEntry {
    /// Whether the step completed.
    pub fn succeeded(&self) -> bool {
        self.status == StepStatus::Completed
    }

    /// Wall-clock time between start and finish.
    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Format as a summary line.
    pub fn summary_line(&self) -> String {
        let mut line = format!("{} {}", self.status.display_char(), self.step);
        if let Some(signal) = &self.signal {
            line.push_str(&format!(" → {}", signal));
        }
        if let Some(error) = &self.error {
            line.push_str(&format!(" - {}", error));
        }
        line
    }
}

/// Append-only log of step firings in execution order.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ExecutionRecord {
    entries: Vec<RecordEntry>,
}

impl ExecutionRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, entry: RecordEntry) {
        self.entries.push(entry);
    }

    /// All entries in execution order.
    pub fn entries(&self) -> &[RecordEntry] {
        &self.entries
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.step.as_str()).collect()
    }

    /// The entry for a step, if it fired.
    pub fn get(&self, step: &str) -> Option<&RecordEntry> {
        self.entries.iter().find(|e| e.step == step)
    }

    /// Entries that did not complete.
    pub fn failures(&self) -> impl Iterator<Item = &RecordEntry> {
        self.entries.iter().filter(|e| !e.succeeded())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
