//! Prompt rendering for crew tasks.

use anyhow::Context as _;
use serde_json::Value;

use crate::config::interpolation::{resolve_string, InterpolationContext};
use crate::config::schema::{AgentConfig, OutputFormat, TaskConfig};
use crate::error::Result;

use super::client::CompletionRequest;

/// Render the agent persona.
pub fn render_system(agent: &AgentConfig, inputs: &InterpolationContext) -> Result<String> {
    let role = resolve_string(&agent.role, inputs)?;
    let goal = resolve_string(&agent.goal, inputs)?;
    let backstory = resolve_string(&agent.backstory, inputs)?;

    let mut system = format!("You are {}.", role);
    if !backstory.trim().is_empty() {
        system.push(' ');
        system.push_str(backstory.trim());
    }
    system.push_str("\nYour personal goal is: ");
    system.push_str(&goal);
    Ok(system)
}

/// Render the task instructions, appending context from earlier tasks.
pub fn render_task(
    task: &TaskConfig,
    inputs: &InterpolationContext,
    context: Option<&str>,
) -> Result<String> {
    let description = resolve_string(&task.description, inputs)?;
    let mut prompt = format!("Current Task: {}", description.trim_end());

    if !task.expected_output.trim().is_empty() {
        let expected = resolve_string(&task.expected_output, inputs)?;
        prompt.push_str("\n\nThis is the expected criteria for your final answer: ");
        prompt.push_str(expected.trim_end());
    }

    if task.output_format == OutputFormat::Json {
        prompt.push_str("\n\nYour final answer must be a valid JSON object, nothing else.");
    }

    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str("\n\nThis is the context you're working with:\n");
        prompt.push_str(context);
    }

    Ok(prompt)
}

/// Text form of a task input used as context.
///
/// Arrays (fan-in from several tasks) are joined by blank lines.
pub fn context_text(input: &Value) -> String {
    match input {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(context_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"),
        other => other.to_string(),
    }
}

/// Turn a completion into the task's output value.
///
/// Text answers pass through as strings. JSON answers are parsed, tolerating
/// a surrounding Markdown code fence.
pub fn parse_answer(answer: &str, format: OutputFormat) -> anyhow::Result<Value> {
    match format {
        OutputFormat::Text => Ok(Value::String(answer.to_string())),
        OutputFormat::Json => {
            let body = strip_fence(answer.trim());
            serde_json::from_str(body).context("answer is not valid JSON")
        }
    }
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (```json) along with the opening line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Build the full request for a task.
pub fn build_request(
    task_id: &str,
    task: &TaskConfig,
    agent: &AgentConfig,
    inputs: &InterpolationContext,
    context: Option<&str>,
) -> Result<CompletionRequest> {
    Ok(CompletionRequest {
        task: task_id.to_string(),
        agent: task.agent.clone(),
        system: render_system(agent, inputs)?,
        prompt: render_task(task, inputs, context)?,
        format: task.output_format,
    })
}
