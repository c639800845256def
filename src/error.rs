//! Error types for stepflow operations.
//!
//! This module defines [`FlowError`], the primary error type used throughout
//! the crate, and a [`Result`] type alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - Registration errors (`DuplicateStep`, `UnknownStep`, `DanglingReference`,
//!   `CyclicDependency`, `InvalidRouter`) are reported before a run starts
//! - Run errors (`StepExecution`, `StepTimeout`, `InvalidSignal`) abort the
//!   current run and name the originating step
//! - State errors (`MissingKey`, `StateDecode`) are local to the calling step
//! - Step functions return `anyhow::Error`; the engine wraps it as the cause

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Core error type for stepflow operations.
#[derive(Debug, Error)]
pub enum FlowError {
    /// A step with this name is already registered.
    #[error("Step '{name}' is already registered")]
    DuplicateStep { name: String },

    /// No step with this name is registered.
    #[error("Unknown step: {name}")]
    UnknownStep { name: String },

    /// The non-signal dependency graph contains a cycle.
    #[error("Circular dependency detected: {cycle}")]
    CyclicDependency { cycle: String },

    /// A trigger names a step or signal that does not exist.
    #[error("Step '{step}' listens to unknown {kind} '{reference}'")]
    DanglingReference {
        step: String,
        kind: ReferenceKind,
        reference: String,
    },

    /// A router declares no branches or repeats one.
    #[error("Router '{step}' is invalid: {message}")]
    InvalidRouter { step: String, message: String },

    /// A step function failed.
    #[error("Step '{step}' failed: {cause:#}")]
    StepExecution {
        step: String,
        #[source]
        cause: anyhow::Error,
    },

    /// A step did not finish within its timeout.
    #[error("Step '{step}' timed out after {timeout:?}")]
    StepTimeout { step: String, timeout: Duration },

    /// A router returned a signal outside its declared branches.
    #[error("Router '{step}' emitted '{signal}', expected one of: {}", .allowed.join(", "))]
    InvalidSignal {
        step: String,
        signal: String,
        allowed: Vec<String>,
    },

    /// Pipeline state has no value under this key.
    #[error("No state value for key '{key}'")]
    MissingKey { key: String },

    /// A state value could not be decoded into the requested type.
    #[error("State value '{key}' has an unexpected shape: {message}")]
    StateDecode { key: String, message: String },

    /// Configuration file not found at expected location.
    #[error("Configuration not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Failed to parse configuration file.
    #[error("Failed to parse config at {path}: {message}")]
    ConfigParseError { path: PathBuf, message: String },

    /// Invalid configuration structure or values.
    #[error("Invalid configuration: {message}")]
    ConfigValidationError { message: String },

    /// A task references an agent that is not defined.
    #[error("Task '{task}' references unknown agent '{agent}'")]
    UnknownAgent { task: String, agent: String },

    /// A prompt references an input that was not supplied.
    #[error("Missing input '{name}'")]
    MissingInput { name: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// What a dangling trigger reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// A step name (`OnStep`, `OnAll`, `OnAny`).
    Step,
    /// A router branch name (`OnSignal`).
    Signal,
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReferenceKind::Step => write!(f, "step"),
            ReferenceKind::Signal => write!(f, "signal"),
        }
    }
}

impl FlowError {
    /// Name of the step that caused a run-time error, if any.
    pub fn step(&self) -> Option<&str> {
        match self {
            FlowError::StepExecution { step, .. }
            | FlowError::StepTimeout { step, .. }
            | FlowError::InvalidSignal { step, .. } => Some(step.as_str()),
            _ => None,
        }
    }

    /// Whether this error was raised while validating a registry.
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            FlowError::DuplicateStep { .. }
                | FlowError::UnknownStep { .. }
                | FlowError::CyclicDependency { .. }
                | FlowError::DanglingReference { .. }
                | FlowError::InvalidRouter { .. }
        )
    }
}

/// Result type alias for stepflow operations.
pub type Result<T> = std::result::Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn duplicate_step_displays_name() {
        let err = FlowError::DuplicateStep {
            name: "fetch".into(),
        };
        assert!(err.to_string().contains("fetch"));
        assert!(err.is_registration_error());
    }

    #[test]
    fn circular_dependency_displays_cycle() {
        let err = FlowError::CyclicDependency {
            cycle: "a -> b -> a".into(),
        };
        assert!(err.to_string().contains("a -> b -> a"));
    }

    #[test]
    fn dangling_reference_names_kind() {
        let err = FlowError::DanglingReference {
            step: "write_email".into(),
            kind: ReferenceKind::Signal,
            reference: "low".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("write_email"));
        assert!(msg.contains("signal 'low'"));
    }

    #[test]
    fn step_execution_keeps_cause_chain() {
        let cause = anyhow::anyhow!("quota exceeded").context("completion request failed");
        let err = FlowError::StepExecution {
            step: "score".into(),
            cause,
        };
        let msg = err.to_string();
        assert!(msg.contains("score"));
        assert!(msg.contains("completion request failed"));
        assert!(msg.contains("quota exceeded"));
        assert!(err.source().is_some());
        assert_eq!(err.step(), Some("score"));
    }

    #[test]
    fn invalid_signal_lists_allowed_branches() {
        let err = FlowError::InvalidSignal {
            step: "route".into(),
            signal: "huge".into(),
            allowed: vec!["low".into(), "high".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("huge"));
        assert!(msg.contains("low, high"));
        assert!(!err.is_registration_error());
    }

    #[test]
    fn step_timeout_displays_duration() {
        let err = FlowError::StepTimeout {
            step: "search".into(),
            timeout: Duration::from_millis(250),
        };
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn missing_key_has_no_step() {
        let err = FlowError::MissingKey { key: "scores".into() };
        assert!(err.to_string().contains("scores"));
        assert_eq!(err.step(), None);
    }

    #[test]
    fn io_error_converts_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: FlowError = io_err.into();
        assert!(matches!(err, FlowError::Io(_)));
    }

    #[test]
    fn result_type_alias_works() {
        fn returns_error() -> Result<()> {
            Err(FlowError::ConfigValidationError {
                message: "test".into(),
            })
        }
        assert!(returns_error().is_err());
    }
}
