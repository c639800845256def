//! Step registry and pipeline builder.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{FlowError, ReferenceKind, Result};

use super::dependency::DependencyGraph;
use super::step::{Step, StepContext, Trigger};

/// Named steps in registration order.
#[derive(Debug, Clone, Default)]
pub struct StepRegistry {
    steps: Vec<Step>,
    index: HashMap<String, usize>,
}

/// Serializable view of one step, used for fingerprints and `check --json`.
#[derive(Debug, Clone, Serialize)]
pub struct StepDefinition<'a> {
    pub name: &'a str,
    pub trigger: &'a Trigger,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branches: Option<&'a [String]>,
}

impl StepRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step.
    ///
    /// Fails with `DuplicateStep` if the name is taken; the registry is
    /// left unchanged in that case.
    pub fn register(&mut self, step: Step) -> Result<()> {
        if self.index.contains_key(&step.name) {
            return Err(FlowError::DuplicateStep { name: step.name });
        }
        self.index.insert(step.name.clone(), self.steps.len());
        self.steps.push(step);
        Ok(())
    }

    /// Look up a step by name.
    pub fn resolve(&self, name: &str) -> Result<&Step> {
        self.index
            .get(name)
            .map(|&i| &self.steps[i])
            .ok_or_else(|| FlowError::UnknownStep {
                name: name.to_string(),
            })
    }

    /// Position of a step in registration order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Check if a step is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Steps in registration order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Get the number of registered steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Every branch name declared by a router.
    pub fn declared_signals(&self) -> HashSet<&str> {
        self.steps
            .iter()
            .filter_map(|s| s.action.branches())
            .flatten()
            .map(String::as_str)
            .collect()
    }

    /// Derive the data dependency graph (signal triggers excluded).
    pub fn dependency_graph(&self) -> Result<DependencyGraph> {
        self.steps
            .iter()
            .fold(DependencyGraph::builder(), |builder, step| {
                builder.add_step(step.name.as_str(), step.trigger.dependencies())
            })
            .build()
    }

    /// Check structural invariants.
    ///
    /// - routers declare at least one branch and no duplicates
    /// - every referenced step exists
    /// - every `OnSignal` names a declared router branch
    /// - the data dependency graph is acyclic
    pub fn validate(&self) -> Result<()> {
        for step in &self.steps {
            if let Some(branches) = step.action.branches() {
                if branches.is_empty() {
                    return Err(FlowError::InvalidRouter {
                        step: step.name.clone(),
                        message: "no branches declared".to_string(),
                    });
                }
                let mut seen = HashSet::new();
                for branch in branches {
                    if !seen.insert(branch) {
                        return Err(FlowError::InvalidRouter {
                            step: step.name.clone(),
                            message: format!("branch '{}' declared twice", branch),
                        });
                    }
                }
            }
        }

        let signals = self.declared_signals();
        for step in &self.steps {
            if let Some(signal) = step.trigger.signal() {
                if !signals.contains(signal) {
                    return Err(FlowError::DanglingReference {
                        step: step.name.clone(),
                        kind: ReferenceKind::Signal,
                        reference: signal.to_string(),
                    });
                }
            }
            if let Trigger::OnAll(deps) | Trigger::OnAny(deps) = &step.trigger {
                if deps.is_empty() {
                    return Err(FlowError::ConfigValidationError {
                        message: format!("Step '{}' listens to an empty step list", step.name),
                    });
                }
            }
        }

        let graph = self.dependency_graph()?;
        if let Some(cycle) = graph.find_cycle() {
            return Err(FlowError::CyclicDependency {
                cycle: cycle.join(" -> "),
            });
        }

        Ok(())
    }

    /// Serializable definitions in registration order.
    pub fn definitions(&self) -> Vec<StepDefinition<'_>> {
        self.steps
            .iter()
            .map(|s| StepDefinition {
                name: &s.name,
                trigger: &s.trigger,
                branches: s.action.branches(),
            })
            .collect()
    }

    /// SHA-256 fingerprint of the registry's definitions.
    ///
    /// Step functions are not part of the fingerprint.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_vec(&self.definitions()).unwrap_or_default();
        hex::encode(Sha256::digest(&json))
    }
}

/// Fluent construction of a validated [`StepRegistry`].
///
/// Registration errors are deferred to [`PipelineBuilder::build`].
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    registry: StepRegistry,
    error: Option<FlowError>,
}

impl PipelineBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a prepared step.
    pub fn step(mut self, step: Step) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.registry.register(step) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Add a task that fires when the run starts.
    pub fn start<F>(self, name: &str, func: F) -> Self
    where
        F: Fn(&StepContext) -> anyhow::Result<serde_json::Value> + Send + Sync + 'static,
    {
        self.step(Step::task(name, Trigger::Start, func))
    }

    /// Add a task that fires after `after` completes.
    pub fn listen<F>(self, name: &str, after: &str, func: F) -> Self
    where
        F: Fn(&StepContext) -> anyhow::Result<serde_json::Value> + Send + Sync + 'static,
    {
        self.step(Step::task(name, Trigger::OnStep(after.to_string()), func))
    }

    /// Add a task that fires after every step in `after` completes.
    pub fn listen_all<F>(self, name: &str, after: &[&str], func: F) -> Self
    where
        F: Fn(&StepContext) -> anyhow::Result<serde_json::Value> + Send + Sync + 'static,
    {
        let deps = after.iter().map(|s| s.to_string()).collect();
        self.step(Step::task(name, Trigger::OnAll(deps), func))
    }

    /// Add a task that fires after the first step in `after` completes.
    pub fn listen_any<F>(self, name: &str, after: &[&str], func: F) -> Self
    where
        F: Fn(&StepContext) -> anyhow::Result<serde_json::Value> + Send + Sync + 'static,
    {
        let deps = after.iter().map(|s| s.to_string()).collect();
        self.step(Step::task(name, Trigger::OnAny(deps), func))
    }

    /// Add a task that fires when a router emits `signal`.
    pub fn on_signal<F>(self, name: &str, signal: &str, func: F) -> Self
    where
        F: Fn(&StepContext) -> anyhow::Result<serde_json::Value> + Send + Sync + 'static,
    {
        self.step(Step::task(name, Trigger::OnSignal(signal.to_string()), func))
    }

    /// Add a router with its declared branches.
    pub fn router<F>(self, name: &str, trigger: Trigger, branches: &[&str], func: F) -> Self
    where
        F: Fn(&StepContext) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        self.step(Step::router(name, trigger, branches.iter().copied(), func))
    }

    /// Finish building and validate.
    pub fn build(self) -> Result<StepRegistry> {
        if let Some(err) = self.error {
            return Err(err);
        }
        self.registry.validate()?;
        Ok(self.registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop(name: &str, trigger: Trigger) -> Step {
        Step::task(name, trigger, |_| Ok(json!(null)))
    }

    #[test]
    fn register_and_resolve() {
        let mut registry = StepRegistry::new();
        registry.register(noop("fetch", Trigger::Start)).unwrap();

        assert_eq!(registry.resolve("fetch").unwrap().name, "fetch");
        assert_eq!(registry.position("fetch"), Some(0));
        assert!(matches!(
            registry.resolve("missing"),
            Err(FlowError::UnknownStep { name }) if name == "missing"
        ));
    }

    #[test]
    fn duplicate_registration_leaves_registry_unchanged() {
        let mut registry = StepRegistry::new();
        registry.register(noop("fetch", Trigger::Start)).unwrap();
        let before = registry.fingerprint();

        let err = registry
            .register(noop("fetch", Trigger::OnStep("other".into())))
            .unwrap_err();

        assert!(matches!(err, FlowError::DuplicateStep { name } if name == "fetch"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("fetch").unwrap().trigger, Trigger::Start);
        assert_eq!(registry.fingerprint(), before);
    }

    #[test]
    fn validate_rejects_dangling_step() {
        let mut registry = StepRegistry::new();
        registry
            .register(noop("score", Trigger::OnStep("fetch".into())))
            .unwrap();

        assert!(matches!(
            registry.validate(),
            Err(FlowError::DanglingReference { kind: ReferenceKind::Step, .. })
        ));
    }

    #[test]
    fn validate_rejects_undeclared_signal() {
        let mut registry = StepRegistry::new();
        registry.register(noop("fetch", Trigger::Start)).unwrap();
        registry
            .register(Step::router(
                "route",
                Trigger::OnStep("fetch".into()),
                ["low", "high"],
                |_| Ok("low".into()),
            ))
            .unwrap();
        registry
            .register(noop("medium_path", Trigger::OnSignal("medium".into())))
            .unwrap();

        let err = registry.validate().unwrap_err();
        assert!(matches!(
            err,
            FlowError::DanglingReference { kind: ReferenceKind::Signal, ref reference, .. }
                if reference == "medium"
        ));
    }

    #[test]
    fn validate_rejects_cycle() {
        let mut registry = StepRegistry::new();
        registry
            .register(noop("a", Trigger::OnStep("b".into())))
            .unwrap();
        registry
            .register(noop("b", Trigger::OnAny(vec!["a".into()])))
            .unwrap();

        assert!(matches!(
            registry.validate(),
            Err(FlowError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn validate_ignores_signal_edges_for_cycles() {
        // route -> low_path is a signal edge and never enters the graph.
        let registry = PipelineBuilder::new()
            .start("fetch", |_| Ok(json!([])))
            .router("route", Trigger::OnAny(vec!["fetch".into()]), &["low"], |_| {
                Ok("low".into())
            })
            .on_signal("low_path", "low", |_| Ok(json!("done")))
            .build();

        assert!(registry.is_ok());
    }

    #[test]
    fn validate_rejects_router_without_branches() {
        let mut registry = StepRegistry::new();
        registry
            .register(Step::router(
                "route",
                Trigger::Start,
                Vec::<String>::new(),
                |_| Ok(String::new()),
            ))
            .unwrap();

        assert!(matches!(
            registry.validate(),
            Err(FlowError::InvalidRouter { .. })
        ));
    }

    #[test]
    fn validate_rejects_repeated_branch() {
        let result = PipelineBuilder::new()
            .router("route", Trigger::Start, &["low", "low"], |_| Ok("low".into()))
            .build();

        assert!(matches!(result, Err(FlowError::InvalidRouter { .. })));
    }

    #[test]
    fn builder_reports_first_registration_error() {
        let result = PipelineBuilder::new()
            .start("fetch", |_| Ok(json!(1)))
            .start("fetch", |_| Ok(json!(2)))
            .build();

        assert!(matches!(result, Err(FlowError::DuplicateStep { .. })));
    }

    #[test]
    fn fingerprint_tracks_structure_not_functions() {
        let a = PipelineBuilder::new()
            .start("fetch", |_| Ok(json!(1)))
            .listen("score", "fetch", |_| Ok(json!(2)))
            .build()
            .unwrap();
        let b = PipelineBuilder::new()
            .start("fetch", |_| Ok(json!("different")))
            .listen("score", "fetch", |_| Ok(json!("body")))
            .build()
            .unwrap();
        let c = PipelineBuilder::new()
            .start("fetch", |_| Ok(json!(1)))
            .listen_any("score", &["fetch"], |_| Ok(json!(2)))
            .build()
            .unwrap();

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn declared_signals_collects_all_routers() {
        let registry = PipelineBuilder::new()
            .router("r1", Trigger::Start, &["a", "b"], |_| Ok("a".into()))
            .router("r2", Trigger::Start, &["c"], |_| Ok("c".into()))
            .build()
            .unwrap();

        let signals = registry.declared_signals();
        assert_eq!(signals.len(), 3);
        assert!(signals.contains("c"));
    }
}
