//! Step definitions: triggers, actions, and the context a step runs in.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use super::state::StateHandle;

/// Signature of a task step.
pub type TaskFn = dyn Fn(&StepContext) -> anyhow::Result<Value> + Send + Sync;

/// Signature of a router step.
pub type RouteFn = dyn Fn(&StepContext) -> anyhow::Result<String> + Send + Sync;

/// The condition under which a step becomes eligible to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "on", rename_all = "snake_case")]
pub enum Trigger {
    /// Ready as soon as the run starts.
    Start,
    /// Ready once the named step has completed.
    OnStep(String),
    /// Ready once every named step has completed.
    OnAll(Vec<String>),
    /// Ready once any of the named steps has completed.
    OnAny(Vec<String>),
    /// Ready once a router has emitted this signal.
    OnSignal(String),
}

impl Trigger {
    /// Steps this trigger depends on for data.
    ///
    /// Signal triggers have no step dependencies.
    pub fn dependencies(&self) -> Vec<&str> {
        match self {
            Trigger::Start | Trigger::OnSignal(_) => Vec::new(),
            Trigger::OnStep(step) => vec![step.as_str()],
            Trigger::OnAll(steps) | Trigger::OnAny(steps) => {
                steps.iter().map(String::as_str).collect()
            }
        }
    }

    /// Signal name for `OnSignal` triggers.
    pub fn signal(&self) -> Option<&str> {
        match self {
            Trigger::OnSignal(name) => Some(name.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Start => write!(f, "start"),
            Trigger::OnStep(step) => write!(f, "after {}", step),
            Trigger::OnAll(steps) => write!(f, "after all of [{}]", steps.join(", ")),
            Trigger::OnAny(steps) => write!(f, "after any of [{}]", steps.join(", ")),
            Trigger::OnSignal(name) => write!(f, "on signal '{}'", name),
        }
    }
}

/// What a step does when it fires.
#[derive(Clone)]
pub enum StepAction {
    /// Produce a data value.
    Task(Arc<TaskFn>),
    /// Pick one of the declared branches.
    Router {
        branches: Vec<String>,
        route: Arc<RouteFn>,
    },
}

impl StepAction {
    /// Declared branches if this is a router.
    pub fn branches(&self) -> Option<&[String]> {
        match self {
            StepAction::Task(_) => None,
            StepAction::Router { branches, .. } => Some(branches.as_slice()),
        }
    }
}

impl fmt::Debug for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepAction::Task(_) => f.write_str("Task"),
            StepAction::Router { branches, .. } => {
                f.debug_struct("Router").field("branches", branches).finish()
            }
        }
    }
}

/// A named unit of work with a trigger.
#[derive(Debug, Clone)]
pub struct Step {
    /// Unique step name.
    pub name: String,
    /// When the step fires.
    pub trigger: Trigger,
    /// What the step does.
    pub action: StepAction,
    /// Overrides the engine-wide step timeout.
    pub timeout: Option<Duration>,
    /// Human-readable description, used by graph export.
    pub description: Option<String>,
}

impl Step {
    /// Create a task step.
    pub fn task<F>(name: impl Into<String>, trigger: Trigger, func: F) -> Self
    where
        F: Fn(&StepContext) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            trigger,
            action: StepAction::Task(Arc::new(func)),
            timeout: None,
            description: None,
        }
    }

    /// Create a router step that may emit any of `branches`.
    pub fn router<F, I, S>(name: impl Into<String>, trigger: Trigger, branches: I, func: F) -> Self
    where
        F: Fn(&StepContext) -> anyhow::Result<String> + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            trigger,
            action: StepAction::Router {
                branches: branches.into_iter().map(Into::into).collect(),
                route: Arc::new(func),
            },
            timeout: None,
            description: None,
        }
    }

    /// Set a per-step timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether this step is a router.
    pub fn is_router(&self) -> bool {
        matches!(self.action, StepAction::Router { .. })
    }
}

/// Cooperative cancellation flag shared between the engine and a step.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a step function can see while it runs.
#[derive(Debug, Clone)]
pub struct StepContext {
    step: String,
    input: Value,
    state: StateHandle,
    step_cancel: CancelFlag,
    run_cancel: CancelFlag,
}

impl StepContext {
    pub(crate) fn new(
        step: &str,
        input: Value,
        state: StateHandle,
        step_cancel: CancelFlag,
        run_cancel: CancelFlag,
    ) -> Self {
        Self {
            step: step.to_string(),
            input,
            state,
            step_cancel,
            run_cancel,
        }
    }

    /// Name of the running step.
    pub fn step(&self) -> &str {
        &self.step
    }

    /// Resolved input value.
    pub fn input(&self) -> &Value {
        &self.input
    }

    /// Shared pipeline state.
    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    /// Whether the engine asked this step to stop.
    ///
    /// Set when the step timed out or a sibling failed in parallel mode.
    pub fn is_cancelled(&self) -> bool {
        self.step_cancel.is_cancelled() || self.run_cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trigger_dependencies() {
        assert!(Trigger::Start.dependencies().is_empty());
        assert!(Trigger::OnSignal("low".into()).dependencies().is_empty());
        assert_eq!(Trigger::OnStep("a".into()).dependencies(), vec!["a"]);
        assert_eq!(
            Trigger::OnAll(vec!["a".into(), "b".into()]).dependencies(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn trigger_display() {
        assert_eq!(Trigger::Start.to_string(), "start");
        assert_eq!(
            Trigger::OnAny(vec!["a".into(), "b".into()]).to_string(),
            "after any of [a, b]"
        );
        assert_eq!(
            Trigger::OnSignal("high".into()).to_string(),
            "on signal 'high'"
        );
    }

    #[test]
    fn trigger_serializes_tagged() {
        let value = serde_json::to_value(Trigger::OnStep("fetch".into())).unwrap();
        assert_eq!(value, json!({"kind": "on_step", "on": "fetch"}));
        let value = serde_json::to_value(Trigger::Start).unwrap();
        assert_eq!(value, json!({"kind": "start"}));
    }

    #[test]
    fn router_collects_branches() {
        let step = Step::router("route", Trigger::Start, ["low", "high"], |_| {
            Ok("low".to_string())
        });
        assert!(step.is_router());
        assert_eq!(
            step.action.branches(),
            Some(&["low".to_string(), "high".to_string()][..])
        );
    }

    #[test]
    fn context_reports_either_cancellation() {
        let step_flag = CancelFlag::new();
        let run_flag = CancelFlag::new();
        let ctx = StepContext::new(
            "a",
            json!(1),
            StateHandle::new(),
            step_flag.clone(),
            run_flag.clone(),
        );
        assert!(!ctx.is_cancelled());
        run_flag.cancel();
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.input(), &json!(1));
        assert_eq!(ctx.step(), "a");
    }
}
