//! Run command implementation.
//!
//! The `stepflow run` command compiles the crew with an [`EchoClient`] and
//! runs it, so every task answers with its rendered prompt. This shows the
//! exact prompts, context threading and trigger order a real client would
//! see, without calling a model.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::cli::args::RunArgs;
use crate::config::StepflowConfig;
use crate::crew::{Crew, EchoClient};
use crate::error::{FlowError, Result};
use crate::flow::{Engine, RunOutcome, RunProgress};
use crate::ui::{format_duration, OutputMode, UserInterface};

use super::dispatcher::{Command, CommandResult};
use super::{load_project_config, ProjectConfig};

/// The run command implementation.
pub struct RunCommand {
    project_root: PathBuf,
    config_override: Option<PathBuf>,
    args: RunArgs,
}

impl RunCommand {
    /// Create a new run command.
    pub fn new(project_root: &Path, config_override: Option<&Path>, args: RunArgs) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            config_override: config_override.map(Path::to_path_buf),
            args,
        }
    }

    /// Get the command arguments.
    pub fn args(&self) -> &RunArgs {
        &self.args
    }

    /// Config inputs overlaid with `--input` values.
    fn base_inputs(&self, config: &StepflowConfig) -> Map<String, Value> {
        let mut inputs: Map<String, Value> = config
            .inputs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, value) in &self.args.inputs {
            inputs.insert(key.clone(), Value::String(value.clone()));
        }
        inputs
    }

    /// One input object per run.
    fn run_inputs(&self, config: &StepflowConfig) -> Result<Vec<Value>> {
        let base = self.base_inputs(config);
        let Some(path) = &self.args.for_each else {
            return Ok(vec![Value::Object(base)]);
        };

        let path = self.project_root.join(path);
        let content = fs::read_to_string(&path)?;
        let items: Vec<Value> =
            serde_json::from_str(&content).map_err(|e| FlowError::ConfigParseError {
                path: path.clone(),
                message: e.to_string(),
            })?;

        items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(fields) => {
                    let mut inputs = base.clone();
                    inputs.extend(fields);
                    Ok(Value::Object(inputs))
                }
                _ => Err(FlowError::ConfigParseError {
                    path: path.clone(),
                    message: format!("item {} is not an object", i),
                }),
            })
            .collect()
    }

    /// Run once, reporting progress on the UI.
    fn run_once(
        &self,
        engine: &mut Engine,
        name: &str,
        input: Value,
        ui: &mut dyn UserInterface,
    ) -> Result<RunOutcome> {
        let mode = ui.output_mode();
        let theme = ui.theme().clone();
        let mut spinner = ui.start_spinner(&format!("Running {}", name));

        let result = engine.run_with_progress(input, |progress| match progress {
            RunProgress::StepStarting { name, .. } => {
                spinner.set_message(&format!("Running {}", name));
            }
            RunProgress::StepFinished { entry } => {
                if mode.shows_steps() {
                    spinner.println(&theme.format_entry(entry));
                }
                if mode.shows_step_output() {
                    if let Some(output) = &entry.output {
                        for line in display_value(output).lines() {
                            spinner.println(&format!("      {}", theme.dim.apply_to(line)));
                        }
                    }
                }
            }
            RunProgress::SignalEmitted { step, signal } => {
                debug!(step, signal, "Signal emitted");
            }
        });

        match &result {
            Ok(outcome) if outcome.success => spinner.finish_success(&format!(
                "{} finished in {}",
                name,
                format_duration(outcome.duration)
            )),
            Ok(outcome) => spinner.finish_error(&format!(
                "{} finished with failed steps: {}",
                name,
                outcome.failed.join(", ")
            )),
            Err(e) => spinner.finish_error(&e.to_string()),
        }
        result
    }
}

/// Strings print as-is, other values as pretty JSON.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// JSON report of one run.
fn report(engine: &Engine, result: &Result<RunOutcome>) -> Value {
    let mut report = json!({
        "fingerprint": engine.fingerprint(),
        "record": engine.record(),
        "state": engine.state().snapshot(),
    });
    match result {
        Ok(outcome) => {
            report["success"] = json!(outcome.success);
            report["output"] = outcome.output.clone().unwrap_or(Value::Null);
            report["final_step"] = json!(outcome.final_step);
            report["failed"] = json!(outcome.failed);
        }
        Err(e) => {
            report["success"] = json!(false);
            report["error"] = json!(e.to_string());
        }
    }
    report
}

impl Command for RunCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let config =
            match load_project_config(&self.project_root, self.config_override.as_deref(), ui)? {
                ProjectConfig::Loaded(config) => config,
                ProjectConfig::Reported(result) => return Ok(result),
            };

        if self.args.json {
            ui.set_output_mode(OutputMode::Silent);
        }

        let inputs = match self.run_inputs(&config) {
            Ok(inputs) => inputs,
            Err(e) => {
                ui.error(&e.to_string());
                return Ok(CommandResult::failure(1));
            }
        };

        let crew = Crew::from_config(&config).output_dir(&self.project_root);
        let mut engine = match crew.engine(EchoClient, config.settings.engine_options()) {
            Ok(engine) => engine,
            Err(e) => {
                ui.error(&e.to_string());
                return Ok(CommandResult::failure(1));
            }
        };

        ui.show_header(crew.name());

        let mut reports = Vec::with_capacity(inputs.len());
        let mut all_succeeded = true;
        let mut last_output = None;

        for input in inputs {
            let result = self.run_once(&mut engine, crew.name(), input, ui);
            reports.push(report(&engine, &result));

            match result {
                Ok(outcome) => {
                    all_succeeded &= outcome.success;
                    last_output = outcome.output;
                }
                Err(_) => {
                    all_succeeded = false;
                    break;
                }
            }
        }

        if self.args.json {
            let value = if self.args.for_each.is_some() {
                Value::Array(reports)
            } else {
                reports.pop().unwrap_or(Value::Null)
            };
            let text = serde_json::to_string_pretty(&value).map_err(anyhow::Error::from)?;
            ui.output(&text);
        } else if ui.output_mode() == OutputMode::Normal {
            if let Some(output) = &last_output {
                ui.message(&display_value(output));
            }
        }

        if all_succeeded {
            Ok(CommandResult::success())
        } else {
            Ok(CommandResult::failure(1))
        }
    }
}
