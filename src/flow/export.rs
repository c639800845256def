//! Read-only graph rendering of a registry.
//!
//! Data edges are solid; signal edges are dashed and labelled with the
//! branch name. Routers render as diamonds.

use std::fmt::Write;

use super::registry::StepRegistry;
use super::step::{Step, Trigger};

/// Output format for [`render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraphFormat {
    /// Graphviz DOT.
    #[default]
    Dot,
    /// Mermaid flowchart.
    Mermaid,
}

/// Render a registry in the given format.
pub fn render(registry: &StepRegistry, format: GraphFormat) -> String {
    match format {
        GraphFormat::Dot => to_dot(registry),
        GraphFormat::Mermaid => to_mermaid(registry),
    }
}

/// An edge between two steps.
struct Edge<'a> {
    from: &'a str,
    to: &'a str,
    signal: Option<&'a str>,
}

/// Every edge in registration order of the target step.
fn edges(registry: &StepRegistry) -> Vec<Edge<'_>> {
    let mut edges = Vec::new();
    for step in registry.steps() {
        match &step.trigger {
            Trigger::OnSignal(signal) => {
                let routers = registry.steps().iter().filter(|r| {
                    r.action
                        .branches()
                        .is_some_and(|b| b.iter().any(|branch| branch == signal))
                });
                for router in routers {
                    edges.push(Edge {
                        from: &router.name,
                        to: &step.name,
                        signal: Some(signal.as_str()),
                    });
                }
            }
            trigger => {
                for dep in trigger.dependencies() {
                    edges.push(Edge {
                        from: dep,
                        to: &step.name,
                        signal: None,
                    });
                }
            }
        }
    }
    edges
}

fn label(step: &Step) -> String {
    match &step.description {
        Some(description) => format!("{}\\n{}", step.name, description),
        None => step.name.clone(),
    }
}

/// Render the registry as a Graphviz digraph.
pub fn to_dot(registry: &StepRegistry) -> String {
    let mut out = String::from("digraph pipeline {\n    rankdir=LR;\n");

    for step in registry.steps() {
        let shape = if step.is_router() { "diamond" } else { "box" };
        let _ = writeln!(
            out,
            "    \"{}\" [shape={}, label=\"{}\"];",
            step.name,
            shape,
            label(step).replace('"', "\\\"")
        );
    }

    for edge in edges(registry) {
        match edge.signal {
            Some(signal) => {
                let _ = writeln!(
                    out,
                    "    \"{}\" -> \"{}\" [style=dashed, label=\"{}\"];",
                    edge.from, edge.to, signal
                );
            }
            None => {
                let _ = writeln!(out, "    \"{}\" -> \"{}\";", edge.from, edge.to);
            }
        }
    }

    out.push_str("}\n");
    out
}

/// Mermaid node ids must be plain identifiers.
fn mermaid_id(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Render the registry as a Mermaid flowchart.
pub fn to_mermaid(registry: &StepRegistry) -> String {
    let mut out = String::from("flowchart LR\n");

    for step in registry.steps() {
        let id = mermaid_id(&step.name);
        let text = step.name.replace('"', "#quot;");
        if step.is_router() {
            let _ = writeln!(out, "    {}{{\"{}\"}}", id, text);
        } else {
            let _ = writeln!(out, "    {}[\"{}\"]", id, text);
        }
    }

    for edge in edges(registry) {
        let from = mermaid_id(edge.from);
        let to = mermaid_id(edge.to);
        match edge.signal {
            Some(signal) => {
                let _ = writeln!(out, "    {} -. {} .-> {}", from, signal, to);
            }
            None => {
                let _ = writeln!(out, "    {} --> {}", from, to);
            }
        }
    }

    out
}
