//! Plot command implementation.
//!
//! The `stepflow plot` command renders the compiled crew as a DOT or
//! Mermaid graph.

use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::args::PlotArgs;
use crate::crew::{Crew, EchoClient};
use crate::error::Result;
use crate::flow::export::render;
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandResult};
use super::{load_project_config, ProjectConfig};

/// The plot command implementation.
pub struct PlotCommand {
    project_root: PathBuf,
    config_override: Option<PathBuf>,
    args: PlotArgs,
}

impl PlotCommand {
    /// Create a new plot command.
    pub fn new(project_root: &Path, config_override: Option<&Path>, args: PlotArgs) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            config_override: config_override.map(Path::to_path_buf),
            args,
        }
    }
}

impl Command for PlotCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let config =
            match load_project_config(&self.project_root, self.config_override.as_deref(), ui)? {
                ProjectConfig::Loaded(config) => config,
                ProjectConfig::Reported(result) => return Ok(result),
            };

        let registry = match Crew::from_config(&config).compile(EchoClient) {
            Ok(registry) => registry,
            Err(e) => {
                ui.error(&e.to_string());
                return Ok(CommandResult::failure(1));
            }
        };
        let graph = render(&registry, self.args.format.into());

        match &self.args.output {
            Some(path) => {
                let path = self.project_root.join(path);
                fs::write(&path, &graph)?;
                ui.success(&format!("Wrote {}", path.display()));
            }
            None => ui.output(graph.trim_end()),
        }

        Ok(CommandResult::success())
    }
}
