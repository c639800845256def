//! Dependency graph for step ordering and cycle detection.
//!
//! The graph only carries data dependencies (`OnStep`, `OnAll`, `OnAny`).
//! Signal triggers are resolved at run time and never form edges here.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{FlowError, ReferenceKind, Result};

/// Represents the dependency relationships between steps.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Map of step name to its direct dependencies.
    dependencies: HashMap<String, Vec<String>>,
    /// Map of step name to steps that depend on it.
    dependents: HashMap<String, Vec<String>>,
    /// All step names in registration order.
    steps: Vec<String>,
}

impl DependencyGraph {
    /// Create a new dependency graph builder.
    pub fn builder() -> DependencyGraphBuilder {
        DependencyGraphBuilder::new()
    }

    /// Get the direct dependencies of a step.
    pub fn dependencies_of(&self, step: &str) -> Option<&[String]> {
        self.dependencies.get(step).map(Vec::as_slice)
    }

    /// Get steps that depend on the given step.
    pub fn dependents_of(&self, step: &str) -> Option<&[String]> {
        self.dependents.get(step).map(Vec::as_slice)
    }

    /// Check if a step exists in the graph.
    pub fn contains(&self, step: &str) -> bool {
        self.dependencies.contains_key(step)
    }

    /// Get all step names in registration order.
    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    /// Get the number of steps in the graph.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns steps in topological order (dependencies before dependents).
    ///
    /// Ties keep registration order. Returns an error if a cycle is detected.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        // Count incoming edges for each node
        let mut in_degree: HashMap<&str, usize> = self
            .steps
            .iter()
            .map(|s| (s.as_str(), self.dependencies.get(s).map_or(0, Vec::len)))
            .collect();

        // Start with nodes that have no dependencies
        let mut queue: VecDeque<&str> = self
            .steps
            .iter()
            .map(String::as_str)
            .filter(|s| in_degree.get(s) == Some(&0))
            .collect();

        let mut result = Vec::with_capacity(self.steps.len());

        while let Some(step) = queue.pop_front() {
            result.push(step.to_string());

            // Reduce in-degree for all dependents
            if let Some(dependents) = self.dependents.get(step) {
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(dependent.as_str());
                        }
                    }
                }
            }
        }

        // If we haven't processed all nodes, there's a cycle
        if result.len() != self.steps.len() {
            let cycle = self.find_cycle().unwrap_or_else(|| {
                self.steps
                    .iter()
                    .filter(|s| in_degree.get(s.as_str()).is_some_and(|d| *d > 0))
                    .cloned()
                    .collect()
            });

            return Err(FlowError::CyclicDependency {
                cycle: cycle.join(" -> "),
            });
        }

        Ok(result)
    }

    /// Find a cycle in the graph, returning the path if one exists.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum State {
            Unvisited,
            Visiting,
            Visited,
        }

        let mut state: HashMap<&str, State> = self
            .steps
            .iter()
            .map(|s| (s.as_str(), State::Unvisited))
            .collect();

        let mut path: Vec<String> = Vec::new();

        fn dfs<'a>(
            node: &'a str,
            graph: &'a DependencyGraph,
            state: &mut HashMap<&'a str, State>,
            path: &mut Vec<String>,
        ) -> Option<Vec<String>> {
            state.insert(node, State::Visiting);
            path.push(node.to_string());

            if let Some(deps) = graph.dependencies.get(node) {
                for dep in deps {
                    match state.get(dep.as_str()) {
                        Some(State::Visiting) => {
                            // Found cycle - build the cycle path
                            let cycle_start = path.iter().position(|s| s == dep).unwrap_or(0);
                            let mut cycle: Vec<String> = path[cycle_start..].to_vec();
                            cycle.push(dep.clone());
                            return Some(cycle);
                        }
                        Some(State::Unvisited) | None => {
                            if let Some(cycle) = dfs(dep, graph, state, path) {
                                return Some(cycle);
                            }
                        }
                        Some(State::Visited) => {}
                    }
                }
            }

            path.pop();
            state.insert(node, State::Visited);
            None
        }

        for step in &self.steps {
            if state.get(step.as_str()) == Some(&State::Unvisited) {
                if let Some(cycle) = dfs(step, self, &mut state, &mut path) {
                    return Some(cycle);
                }
            }
        }

        None
    }

    /// Get all transitive dependents of a step.
    ///
    /// Returns steps that depend on the given step, directly or indirectly.
    pub fn transitive_dependents(&self, step: &str) -> HashSet<String> {
        let mut result = HashSet::new();
        let mut to_visit = vec![step.to_string()];

        while let Some(current) = to_visit.pop() {
            if let Some(dependents) = self.dependents.get(&current) {
                for dep in dependents {
                    if result.insert(dep.clone()) {
                        to_visit.push(dep.clone());
                    }
                }
            }
        }

        result
    }
}

/// Builder for constructing a DependencyGraph.
#[derive(Debug, Default)]
pub struct DependencyGraphBuilder {
    order: Vec<String>,
    dependencies: HashMap<String, Vec<String>>,
}

impl DependencyGraphBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step with its dependencies.
    pub fn add_step<I, S>(mut self, name: impl Into<String>, depends_on: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        if !self.dependencies.contains_key(&name) {
            self.order.push(name.clone());
        }
        let deps = self.dependencies.entry(name).or_default();
        for dep in depends_on {
            let dep = dep.into();
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }
        self
    }

    /// Build the dependency graph.
    ///
    /// Returns an error if any dependency references a non-existent step.
    pub fn build(self) -> Result<DependencyGraph> {
        // Validate all dependencies exist, in registration order
        for step in &self.order {
            for dep in &self.dependencies[step] {
                if !self.dependencies.contains_key(dep) {
                    return Err(FlowError::DanglingReference {
                        step: step.clone(),
                        kind: ReferenceKind::Step,
                        reference: dep.clone(),
                    });
                }
            }
        }

        // Build dependents map (reverse lookup)
        let mut dependents: HashMap<String, Vec<String>> = self
            .order
            .iter()
            .map(|s| (s.clone(), Vec::new()))
            .collect();

        for step in &self.order {
            for dep in &self.dependencies[step] {
                if let Some(list) = dependents.get_mut(dep) {
                    list.push(step.clone());
                }
            }
        }

        Ok(DependencyGraph {
            dependencies: self.dependencies,
            dependents,
            steps: self.order,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn none() -> Vec<String> {
        Vec::new()
    }

    #[test]
    fn builder_creates_empty_graph() {
        let graph = DependencyGraph::builder().build().unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn builder_adds_step_with_dependencies() {
        let graph = DependencyGraph::builder()
            .add_step("fetch", none())
            .add_step("score", ["fetch"])
            .build()
            .unwrap();

        assert!(graph.contains("fetch"));
        assert!(graph.contains("score"));
        assert_eq!(graph.dependencies_of("score").unwrap(), ["fetch"]);
    }

    #[test]
    fn builder_tracks_dependents_in_order() {
        let graph = DependencyGraph::builder()
            .add_step("score", none())
            .add_step("store", ["score"])
            .add_step("filter", ["score"])
            .build()
            .unwrap();

        assert_eq!(graph.dependents_of("score").unwrap(), ["store", "filter"]);
    }

    #[test]
    fn builder_rejects_unknown_dependency() {
        let err = DependencyGraph::builder()
            .add_step("score", ["nonexistent"])
            .build()
            .unwrap_err();

        assert!(matches!(
            err,
            FlowError::DanglingReference { ref step, ref reference, kind: ReferenceKind::Step }
                if step == "score" && reference == "nonexistent"
        ));
    }

    #[test]
    fn topo_sort_keeps_registration_order_for_ties() {
        let graph = DependencyGraph::builder()
            .add_step("b", none())
            .add_step("a", none())
            .add_step("c", ["a", "b"])
            .build()
            .unwrap();

        assert_eq!(graph.topological_order().unwrap(), vec!["b", "a", "c"]);
    }

    #[test]
    fn topo_sort_diamond_dependency() {
        let graph = DependencyGraph::builder()
            .add_step("a", none())
            .add_step("b", ["a"])
            .add_step("c", ["a"])
            .add_step("d", ["b", "c"])
            .build()
            .unwrap();

        assert_eq!(graph.topological_order().unwrap(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn topo_sort_reports_cycle_path() {
        let graph = DependencyGraph::builder()
            .add_step("a", ["b"])
            .add_step("b", ["a"])
            .build()
            .unwrap();

        let err = graph.topological_order().unwrap_err();
        match err {
            FlowError::CyclicDependency { cycle } => assert_eq!(cycle, "a -> b -> a"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn no_cycle_returns_none() {
        let graph = DependencyGraph::builder()
            .add_step("a", none())
            .add_step("b", ["a"])
            .build()
            .unwrap();

        assert!(graph.find_cycle().is_none());
    }

    #[test]
    fn longer_cycle_returns_full_path() {
        let graph = DependencyGraph::builder()
            .add_step("a", ["c"])
            .add_step("b", ["a"])
            .add_step("c", ["b"])
            .build()
            .unwrap();

        let path = graph.find_cycle().unwrap();
        assert_eq!(path.first(), path.last());
        assert!(path.contains(&"a".to_string()));
        assert!(path.contains(&"b".to_string()));
        assert!(path.contains(&"c".to_string()));
    }

    #[test]
    fn self_cycle_detected() {
        let graph = DependencyGraph::builder()
            .add_step("a", ["a"])
            .build()
            .unwrap();

        assert_eq!(graph.find_cycle().unwrap(), vec!["a", "a"]);
    }

    #[test]
    fn transitive_dependents_indirect() {
        let graph = DependencyGraph::builder()
            .add_step("a", none())
            .add_step("b", ["a"])
            .add_step("c", ["b"])
            .build()
            .unwrap();

        let deps = graph.transitive_dependents("a");
        assert!(deps.contains("b"));
        assert!(deps.contains("c"));
        assert!(graph.transitive_dependents("c").is_empty());
    }
}
