//! Input interpolation for agent and task text.
//!
//! Agent roles, goals, backstories and task descriptions may reference run
//! inputs with `{name}` placeholders.
//!
//! # Syntax
//!
//! - `{input_name}` - replaced with the input's value
//! - `{{` and `}}` - literal `{` and `}`
//!
//! Braces that do not enclose a plain identifier are left as they are, so
//! inline JSON samples in task descriptions survive rendering.
//!
//! ```yaml
//! description: "Research the latest news on {topic}."
//! # With topic="Rust", produces: Research the latest news on Rust.
//! ```

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use crate::error::{FlowError, Result};

/// A segment of an interpolated string.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Literal text
    Literal(String),
    /// Input reference: {name}
    Variable(String),
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse a string containing `{name}` placeholders.
pub fn parse_interpolation(input: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current_literal = String::new();
    let mut rest = input;

    while let Some(c) = rest.chars().next() {
        if rest.starts_with("{{") {
            current_literal.push('{');
            rest = &rest[2..];
        } else if rest.starts_with("}}") {
            current_literal.push('}');
            rest = &rest[2..];
        } else if c == '{' {
            let placeholder = rest[1..]
                .find('}')
                .map(|end| &rest[1..=end])
                .filter(|name| is_identifier(name));

            match placeholder {
                Some(name) => {
                    if !current_literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut current_literal)));
                    }
                    segments.push(Segment::Variable(name.to_string()));
                    rest = &rest[name.len() + 2..];
                }
                None => {
                    current_literal.push('{');
                    rest = &rest[1..];
                }
            }
        } else {
            current_literal.push(c);
            rest = &rest[c.len_utf8()..];
        }
    }

    if !current_literal.is_empty() {
        segments.push(Segment::Literal(current_literal));
    }

    segments
}

/// Extract all input names referenced by a string.
pub fn extract_variables(input: &str) -> HashSet<String> {
    parse_interpolation(input)
        .into_iter()
        .filter_map(|seg| match seg {
            Segment::Variable(name) => Some(name),
            _ => None,
        })
        .collect()
}

/// Input values available to placeholders.
#[derive(Debug, Clone, Default)]
pub struct InterpolationContext {
    values: BTreeMap<String, String>,
}

impl InterpolationContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from JSON values.
    ///
    /// Strings are used verbatim; other values use their JSON text.
    pub fn from_values<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a Value)>,
    {
        let values = values
            .into_iter()
            .map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), text)
            })
            .collect();
        Self { values }
    }

    /// Add or replace a value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Resolve a name to its value.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// Replace every placeholder in `input`.
///
/// # Errors
///
/// Returns `MissingInput` naming the first placeholder with no value.
pub fn resolve_string(input: &str, context: &InterpolationContext) -> Result<String> {
    let mut result = String::with_capacity(input.len());

    for segment in parse_interpolation(input) {
        match segment {
            Segment::Literal(text) => result.push_str(&text),
            Segment::Variable(name) => {
                let value = context
                    .resolve(&name)
                    .ok_or(FlowError::MissingInput { name })?;
                result.push_str(value);
            }
        }
    }

    Ok(result)
}
