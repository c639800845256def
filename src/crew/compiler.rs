//! Compiling a crew of agents and tasks into a step pipeline.
//!
//! Tasks run in the order they are declared. Each task becomes one step:
//!
//! - a task with `context` waits for exactly those tasks
//! - otherwise it follows the previous synchronous task
//! - consecutive `async_execution` tasks all follow the same synchronous
//!   task, and the next synchronous task waits for every one of them

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use serde_json::Value;
use tracing::debug;

use crate::config::interpolation::InterpolationContext;
use crate::config::schema::{AgentConfig, StepflowConfig, TaskConfig};
use crate::error::{FlowError, Result};
use crate::flow::{Engine, EngineOptions, Step, StepContext, StepRegistry, Trigger};

use super::client::CompletionClient;
use super::prompt::{build_request, context_text, parse_answer};

/// A named group of agents and the tasks they perform.
#[derive(Debug, Clone, Default)]
pub struct Crew {
    name: String,
    agents: BTreeMap<String, AgentConfig>,
    tasks: Vec<(String, TaskConfig)>,
    output_dir: PathBuf,
}

impl Crew {
    /// Create an empty crew.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create a crew from a loaded config.
    pub fn from_config(config: &StepflowConfig) -> Self {
        Self {
            name: config.name.clone().unwrap_or_else(|| "crew".to_string()),
            agents: config.agents.clone(),
            tasks: config.tasks.0.clone(),
            output_dir: PathBuf::new(),
        }
    }

    /// Add an agent.
    pub fn agent(mut self, id: impl Into<String>, agent: AgentConfig) -> Self {
        self.agents.insert(id.into(), agent);
        self
    }

    /// Append a task.
    pub fn task(mut self, id: impl Into<String>, task: TaskConfig) -> Self {
        self.tasks.push((id.into(), task));
        self
    }

    /// Resolve relative `output_file` paths against `dir`.
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Crew name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tasks in declared order.
    pub fn tasks(&self) -> &[(String, TaskConfig)] {
        &self.tasks
    }

    /// The trigger each task compiles to, in task order.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAgent` if a task names an agent the crew lacks.
    pub fn plan(&self) -> Result<Vec<(String, Trigger)>> {
        let mut plan = Vec::with_capacity(self.tasks.len());
        let mut last_sync: Option<&str> = None;
        let mut pending_async: Vec<&str> = Vec::new();

        for (id, task) in &self.tasks {
            if !self.agents.contains_key(&task.agent) {
                return Err(FlowError::UnknownAgent {
                    task: id.clone(),
                    agent: task.agent.clone(),
                });
            }

            let trigger = if !task.context.is_empty() {
                listen_to(task.context.iter().map(String::as_str))
            } else if task.async_execution || pending_async.is_empty() {
                match last_sync {
                    Some(prev) => Trigger::OnStep(prev.to_string()),
                    None => Trigger::Start,
                }
            } else {
                listen_to(pending_async.iter().copied())
            };

            if task.async_execution {
                pending_async.push(id.as_str());
            } else {
                last_sync = Some(id.as_str());
                pending_async.clear();
            }

            plan.push((id.clone(), trigger));
        }

        Ok(plan)
    }

    /// Compile the crew into a validated step registry.
    pub fn compile<C>(&self, client: C) -> Result<StepRegistry>
    where
        C: CompletionClient + 'static,
    {
        let client: Arc<dyn CompletionClient> = Arc::new(client);
        let mut registry = StepRegistry::new();

        for ((id, trigger), (_, task)) in self.plan()?.into_iter().zip(&self.tasks) {
            let agent = self.agents[&task.agent].clone();
            debug!(task = %id, trigger = %trigger, "Compiling task");

            let reads_context = trigger != Trigger::Start;
            let output_file = task
                .output_file
                .as_ref()
                .map(|path| self.output_dir.join(path));
            let runner = TaskRunner {
                id: id.clone(),
                task: task.clone(),
                agent: agent.clone(),
                client: Arc::clone(&client),
                reads_context,
                output_file,
            };

            let mut step = Step::task(id, trigger, move |ctx| runner.run(ctx))
                .with_description(agent.role);
            if let Some(secs) = task.timeout_secs {
                step = step.with_timeout(std::time::Duration::from_secs(secs));
            }
            registry.register(step)?;
        }

        registry.validate()?;
        Ok(registry)
    }

    /// Compile the crew and wrap it in an engine.
    pub fn engine<C>(&self, client: C, options: EngineOptions) -> Result<Engine>
    where
        C: CompletionClient + 'static,
    {
        Engine::new(self.compile(client)?, options)
    }
}

fn listen_to<'a>(steps: impl Iterator<Item = &'a str>) -> Trigger {
    let mut steps: Vec<String> = steps.map(String::from).collect();
    if steps.len() == 1 {
        Trigger::OnStep(steps.remove(0))
    } else {
        Trigger::OnAll(steps)
    }
}

/// Everything one compiled task needs at run time.
struct TaskRunner {
    id: String,
    task: TaskConfig,
    agent: AgentConfig,
    client: Arc<dyn CompletionClient>,
    reads_context: bool,
    output_file: Option<PathBuf>,
}

impl TaskRunner {
    fn run(&self, ctx: &StepContext) -> anyhow::Result<Value> {
        let snapshot = ctx.state().snapshot();
        let inputs = InterpolationContext::from_values(snapshot.iter());
        let context = self.reads_context.then(|| context_text(ctx.input()));

        let request = build_request(
            &self.id,
            &self.task,
            &self.agent,
            &inputs,
            context.as_deref(),
        )?;
        let answer = self
            .client
            .complete(&request)
            .with_context(|| format!("{} could not complete '{}'", self.agent.role, self.id))?;

        if let Some(path) = &self.output_file {
            write_output(path, &answer)?;
        }

        parse_answer(&answer, self.task.output_format)
            .with_context(|| format!("'{}' expects a JSON answer", self.id))
    }
}

fn write_output(path: &Path, text: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}
