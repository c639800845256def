//! Configuration validation rules.
//!
//! This module checks a crew config before it is compiled:
//! - Tasks must name a defined agent
//! - `context` must reference earlier tasks
//! - `settings.exit_step` must name a task
//! - Timeouts and `max_parallel` must be positive
//! - No two tasks may write the same output file

use std::collections::{HashMap, HashSet};

use crate::config::schema::StepflowConfig;
use crate::error::{FlowError, Result};

/// Validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Rule identifier
    pub rule: String,
    /// Human-readable error message
    pub message: String,
    /// Task id if the error is task-specific
    pub task: Option<String>,
}

impl ValidationError {
    fn task(rule: &str, task: &str, message: String) -> Self {
        Self {
            rule: rule.to_string(),
            message,
            task: Some(task.to_string()),
        }
    }

    fn global(rule: &str, message: String) -> Self {
        Self {
            rule: rule.to_string(),
            message,
            task: None,
        }
    }
}

/// Validate a configuration and return all errors.
///
/// All errors are collected rather than stopping at the first one.
pub fn validate_config(config: &StepflowConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    errors.extend(validate_settings(config));
    errors.extend(validate_tasks(config));

    errors
}

fn validate_settings(config: &StepflowConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let settings = &config.settings;

    if settings.max_parallel == 0 {
        errors.push(ValidationError::global(
            "invalid-max-parallel",
            "settings.max_parallel must be at least 1".to_string(),
        ));
    }

    if settings.step_timeout_secs == Some(0) {
        errors.push(ValidationError::global(
            "invalid-timeout",
            "settings.step_timeout_secs must be at least 1".to_string(),
        ));
    }

    if let Some(exit) = &settings.exit_step {
        if config.tasks.get(exit).is_none() {
            errors.push(ValidationError::global(
                "unknown-exit-step",
                format!("settings.exit_step '{}' is not a task", exit),
            ));
        }
    }

    errors
}

fn validate_tasks(config: &StepflowConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut earlier: HashSet<&str> = HashSet::new();
    let mut output_files: HashMap<&std::path::Path, &str> = HashMap::new();

    for (id, task) in config.tasks.iter() {
        if task.description.trim().is_empty() {
            errors.push(ValidationError::task(
                "missing-description",
                id,
                format!("Task '{}' has no description", id),
            ));
        }

        if !config.agents.contains_key(&task.agent) {
            errors.push(ValidationError::task(
                "unknown-agent",
                id,
                format!("Task '{}' uses agent '{}' which does not exist", id, task.agent),
            ));
        }

        for dep in &task.context {
            if dep == id {
                errors.push(ValidationError::task(
                    "self-context",
                    id,
                    format!("Task '{}' lists itself as context", id),
                ));
            } else if !earlier.contains(dep.as_str()) {
                let message = if config.tasks.get(dep).is_some() {
                    format!("Task '{}' uses context '{}' which comes after it", id, dep)
                } else {
                    format!("Task '{}' uses context '{}' which does not exist", id, dep)
                };
                errors.push(ValidationError::task("unknown-context", id, message));
            }
        }

        if task.timeout_secs == Some(0) {
            errors.push(ValidationError::task(
                "invalid-timeout",
                id,
                format!("Task '{}' has a zero timeout", id),
            ));
        }

        if let Some(path) = &task.output_file {
            if let Some(other) = output_files.insert(path.as_path(), id) {
                errors.push(ValidationError::task(
                    "duplicate-output-file",
                    id,
                    format!(
                        "Tasks '{}' and '{}' both write '{}'",
                        other,
                        id,
                        path.display()
                    ),
                ));
            }
        }

        earlier.insert(id);
    }

    errors
}

/// Validate and return Result (for convenience).
///
/// # Errors
///
/// Returns `ConfigValidationError` if any validation rules fail.
pub fn validate(config: &StepflowConfig) -> Result<()> {
    let errors = validate_config(config);

    if errors.is_empty() {
        Ok(())
    } else {
        let messages: Vec<_> = errors.iter().map(|e| e.message.clone()).collect();
        Err(FlowError::ConfigValidationError {
            message: messages.join("; "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> StepflowConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    const AGENTS: &str = r#"
agents:
  planner:
    role: Planner
    goal: Plan
  writer:
    role: Writer
    goal: Write
"#;

    fn with_agents(tasks: &str) -> StepflowConfig {
        config(&format!("{}{}", AGENTS, tasks))
    }

    fn rules(config: &StepflowConfig) -> Vec<String> {
        validate_config(config).into_iter().map(|e| e.rule).collect()
    }

    #[test]
    fn valid_config_passes() {
        let config = with_agents(
            r#"
tasks:
  plan:
    description: Plan {topic}
    agent: planner
  write:
    description: Write {topic}
    agent: writer
    context: [plan]
settings:
  exit_step: write
"#,
        );

        assert!(validate(&config).is_ok());
    }

    #[test]
    fn reports_unknown_agent() {
        let config = with_agents("tasks:\n  plan:\n    description: Plan\n    agent: editor\n");

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].rule, "unknown-agent");
        assert_eq!(errors[0].task.as_deref(), Some("plan"));
    }

    #[test]
    fn reports_forward_and_missing_context() {
        let config = with_agents(
            r#"
tasks:
  plan:
    description: Plan
    agent: planner
    context: [write, research]
  write:
    description: Write
    agent: writer
"#,
        );

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.contains("comes after"));
        assert!(errors[1].message.contains("does not exist"));
    }

    #[test]
    fn reports_self_context() {
        let config = with_agents(
            "tasks:\n  plan:\n    description: Plan\n    agent: planner\n    context: [plan]\n",
        );
        assert_eq!(rules(&config), vec!["self-context"]);
    }

    #[test]
    fn reports_unknown_exit_step() {
        let config = with_agents(
            "settings:\n  exit_step: publish\ntasks:\n  plan:\n    description: Plan\n    agent: planner\n",
        );
        assert_eq!(rules(&config), vec!["unknown-exit-step"]);
    }

    #[test]
    fn reports_zero_limits() {
        let config = with_agents(
            r#"
settings:
  max_parallel: 0
  step_timeout_secs: 0
tasks:
  plan:
    description: Plan
    agent: planner
    timeout_secs: 0
"#,
        );
        assert_eq!(
            rules(&config),
            vec!["invalid-max-parallel", "invalid-timeout", "invalid-timeout"]
        );
    }

    #[test]
    fn reports_duplicate_output_file() {
        let config = with_agents(
            r#"
tasks:
  plan:
    description: Plan
    agent: planner
    output_file: report.md
  write:
    description: Write
    agent: writer
    output_file: report.md
"#,
        );

        let errors = validate_config(&config);
        assert_eq!(errors[0].rule, "duplicate-output-file");
        assert!(errors[0].message.contains("'plan' and 'write'"));
    }

    #[test]
    fn reports_blank_description() {
        let config = with_agents("tasks:\n  plan:\n    description: '  '\n    agent: planner\n");
        assert_eq!(rules(&config), vec!["missing-description"]);
    }

    #[test]
    fn validate_joins_messages() {
        let config = config(
            "tasks:\n  plan:\n    description: Plan\n    agent: a\n  write:\n    description: W\n    agent: b\n",
        );

        let err = validate(&config).unwrap_err();
        match err {
            FlowError::ConfigValidationError { message } => {
                assert!(message.contains("agent 'a'"));
                assert!(message.contains("; "));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
