//! Check command implementation.
//!
//! The `stepflow check` command validates the config, compiles the crew and
//! prints the resulting steps with their triggers.

use std::path::{Path, PathBuf};

use serde_json::json;

use crate::cli::args::CheckArgs;
use crate::config::ConfigPaths;
use crate::crew::{Crew, EchoClient};
use crate::error::Result;
use crate::flow::Engine;
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandResult};
use super::{load_project_config, ProjectConfig};

/// The check command implementation.
pub struct CheckCommand {
    project_root: PathBuf,
    config_override: Option<PathBuf>,
    args: CheckArgs,
}

impl CheckCommand {
    /// Create a new check command.
    pub fn new(project_root: &Path, config_override: Option<&Path>, args: CheckArgs) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            config_override: config_override.map(Path::to_path_buf),
            args,
        }
    }

    fn config_files(&self) -> Vec<PathBuf> {
        match &self.config_override {
            Some(path) => vec![path.clone()],
            None => ConfigPaths::discover(&self.project_root)
                .all_existing()
                .into_iter()
                .cloned()
                .collect(),
        }
    }
}

impl Command for CheckCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let config =
            match load_project_config(&self.project_root, self.config_override.as_deref(), ui)? {
                ProjectConfig::Loaded(config) => config,
                ProjectConfig::Reported(result) => return Ok(result),
            };

        let crew = Crew::from_config(&config).output_dir(&self.project_root);
        let engine = match crew
            .compile(EchoClient)
            .and_then(|registry| Engine::new(registry, config.settings.engine_options()))
        {
            Ok(engine) => engine,
            Err(e) => {
                ui.error(&e.to_string());
                return Ok(CommandResult::failure(1));
            }
        };
        let registry = engine.registry();

        if self.args.json {
            let order = registry.dependency_graph()?.topological_order()?;
            let report = json!({
                "name": crew.name(),
                "fingerprint": engine.fingerprint(),
                "steps": registry.definitions(),
                "order": order,
            });
            let text = serde_json::to_string_pretty(&report).map_err(anyhow::Error::from)?;
            ui.output(&text);
            return Ok(CommandResult::success());
        }

        ui.show_header(crew.name());
        let files: Vec<String> = self
            .config_files()
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        let fields = [
            ("config", files.join(", ")),
            ("steps", registry.len().to_string()),
            ("fingerprint", engine.fingerprint().to_string()),
        ];
        for (key, value) in &fields {
            let line = ui.theme().format_field(key, value);
            ui.message(&line);
        }

        let width = registry
            .steps()
            .iter()
            .map(|s| s.name.len())
            .max()
            .unwrap_or(0);
        for step in registry.steps() {
            let line = format!(
                "    {:<width$}  {}",
                step.name,
                ui.theme().dim.apply_to(&step.trigger),
                width = width
            );
            ui.message(&line);
        }

        if registry.is_empty() {
            ui.warning("No tasks defined");
        } else {
            ui.success("Configuration is valid");
        }
        Ok(CommandResult::success())
    }
}
