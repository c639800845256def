//! Configuration schema definitions.
//!
//! These structs map to the `stepflow.yml` file format.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use schemars::JsonSchema;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::flow::EngineOptions;

/// Root configuration structure for `stepflow.yml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StepflowConfig {
    /// Crew name (for display purposes)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Engine and output settings
    pub settings: Settings,

    /// Default values for `{name}` placeholders
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, Value>,

    /// Agent definitions keyed by id
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub agents: BTreeMap<String, AgentConfig>,

    /// Task definitions in execution order
    #[schemars(with = "BTreeMap<String, TaskConfig>")]
    pub tasks: TaskList,
}

/// Settings that apply to every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Settings {
    /// Timeout in seconds for tasks without their own
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_timeout_secs: Option<u64>,

    /// Record failed tasks and keep going
    #[serde(skip_serializing_if = "is_false")]
    pub continue_on_error: bool,

    /// Execute ready tasks together
    #[serde(skip_serializing_if = "is_false")]
    pub parallel: bool,

    /// Maximum tasks executed together
    #[serde(skip_serializing_if = "is_default_max_parallel")]
    pub max_parallel: usize,

    /// Task whose output is the run's result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_step: Option<String>,

    /// Default output mode: verbose, normal, quiet, silent
    pub default_output: OutputMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            step_timeout_secs: None,
            continue_on_error: false,
            parallel: false,
            max_parallel: default_max_parallel(),
            exit_step: None,
            default_output: OutputMode::default(),
        }
    }
}

impl Settings {
    /// Engine options described by these settings.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            step_timeout: self.step_timeout_secs.map(Duration::from_secs),
            continue_on_error: self.continue_on_error,
            parallel: self.parallel,
            max_parallel: self.max_parallel,
            exit_step: self.exit_step.clone(),
        }
    }
}

fn default_max_parallel() -> usize {
    crate::flow::engine::DEFAULT_MAX_PARALLEL
}

fn is_default_max_parallel(v: &usize) -> bool {
    *v == default_max_parallel()
}

fn is_false(v: &bool) -> bool {
    !v
}

/// Output verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Verbose,
    #[default]
    Normal,
    Quiet,
    Silent,
}

/// A role-playing agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AgentConfig {
    /// Role the agent plays, e.g. "Content Planner"
    pub role: String,

    /// What the agent tries to achieve
    pub goal: String,

    /// Background that shapes the agent's answers
    #[serde(default)]
    pub backstory: String,
}

/// A unit of work assigned to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskConfig {
    /// What to do
    pub description: String,

    /// What a good answer looks like
    #[serde(default)]
    pub expected_output: String,

    /// Agent id that performs the task
    pub agent: String,

    /// Tasks whose outputs this task reads
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,

    /// Run alongside neighbouring async tasks
    #[serde(default, skip_serializing_if = "is_false")]
    pub async_execution: bool,

    /// Write the task's output to this file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<PathBuf>,

    /// Timeout in seconds, overriding `settings.step_timeout_secs`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Shape of the answer passed to later tasks
    #[serde(default, skip_serializing_if = "OutputFormat::is_text")]
    pub output_format: OutputFormat,
}

/// How a task's answer is handed downstream.
///
/// `json` answers are parsed, so routers and later steps receive structured
/// data instead of a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    fn is_text(&self) -> bool {
        *self == OutputFormat::Text
    }
}

/// Tasks keyed by id, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskList(pub Vec<(String, TaskConfig)>);

impl TaskList {
    /// Iterate tasks in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TaskConfig)> {
        self.0.iter().map(|(id, task)| (id.as_str(), task))
    }

    /// Look up a task by id.
    pub fn get(&self, id: &str) -> Option<&TaskConfig> {
        self.0.iter().find(|(t, _)| t == id).map(|(_, task)| task)
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no tasks.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for TaskList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (id, task) in &self.0 {
            map.serialize_entry(id, task)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TaskList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TaskListVisitor;

        impl<'de> Visitor<'de> for TaskListVisitor {
            type Value = TaskList;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of task id to task")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<TaskList, A::Error> {
                let mut tasks: Vec<(String, TaskConfig)> = Vec::new();
                while let Some((id, task)) = access.next_entry::<String, TaskConfig>()? {
                    if tasks.iter().any(|(existing, _)| *existing == id) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate task '{}'",
                            id
                        )));
                    }
                    tasks.push((id, task));
                }
                Ok(TaskList(tasks))
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<TaskList, E> {
                Ok(TaskList::default())
            }
        }

        deserializer.deserialize_any(TaskListVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let config: StepflowConfig = serde_yaml::from_str("name: writer").unwrap();
        assert_eq!(config.name.as_deref(), Some("writer"));
        assert_eq!(config.settings, Settings::default());
        assert!(config.tasks.is_empty());
    }

    #[test]
    fn settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.max_parallel, 4);
        assert!(!settings.parallel);
        assert_eq!(settings.default_output, OutputMode::Normal);
    }

    #[test]
    fn settings_map_to_engine_options() {
        let settings: Settings = serde_yaml::from_str(
            "step_timeout_secs: 30\ncontinue_on_error: true\nexit_step: edit",
        )
        .unwrap();
        let options = settings.engine_options();

        assert_eq!(options.step_timeout, Some(Duration::from_secs(30)));
        assert!(options.continue_on_error);
        assert_eq!(options.exit_step.as_deref(), Some("edit"));
        assert_eq!(options.max_parallel, 4);
    }

    #[test]
    fn tasks_keep_file_order() {
        let config: StepflowConfig = serde_yaml::from_str(
            r#"
tasks:
  write:
    description: Write
    agent: writer
  plan:
    description: Plan
    agent: planner
  edit:
    description: Edit
    agent: editor
    context: [write]
"#,
        )
        .unwrap();

        let ids: Vec<_> = config.tasks.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["write", "plan", "edit"]);
        assert_eq!(config.tasks.get("edit").unwrap().context, vec!["write"]);
    }

    #[test]
    fn task_defaults() {
        let task: TaskConfig =
            serde_yaml::from_str("description: Plan\nagent: planner").unwrap();
        assert!(!task.async_execution);
        assert!(task.context.is_empty());
        assert!(task.output_file.is_none());
        assert_eq!(task.expected_output, "");
        assert_eq!(task.output_format, OutputFormat::Text);
    }

    #[test]
    fn task_output_format_parses() {
        let task: TaskConfig =
            serde_yaml::from_str("description: Score
agent: scorer
output_format: json").unwrap();
        assert_eq!(task.output_format, OutputFormat::Json);
        assert!(serde_yaml::from_str::<TaskConfig>(
            "description: Score
agent: scorer
output_format: xml"
        )
        .is_err());
    }

    #[test]
    fn empty_tasks_key_is_allowed() {
        let config: StepflowConfig = serde_yaml::from_str("tasks:").unwrap();
        assert!(config.tasks.is_empty());
    }

    #[test]
    fn task_list_serializes_as_mapping() {
        let config: StepflowConfig = serde_yaml::from_str(
            "tasks:\n  b:\n    description: B\n    agent: x\n  a:\n    description: A\n    agent: x\n",
        )
        .unwrap();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.find("  b:").unwrap() < yaml.find("  a:").unwrap());
    }

    #[test]
    fn inputs_accept_any_yaml_value() {
        let config: StepflowConfig =
            serde_yaml::from_str("inputs:\n  topic: Rust\n  participants: 500").unwrap();
        assert_eq!(config.inputs["topic"], Value::String("Rust".into()));
        assert_eq!(config.inputs["participants"], serde_json::json!(500));
    }

    #[test]
    fn output_mode_parses_lowercase() {
        let mode: OutputMode = serde_yaml::from_str("quiet").unwrap();
        assert_eq!(mode, OutputMode::Quiet);
    }
}
