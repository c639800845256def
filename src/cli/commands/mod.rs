//! CLI command implementations.
//!
//! Each command implements the [`Command`] trait, which provides a uniform
//! interface for executing commands and reporting results.
//!
//! # Architecture
//!
//! Commands are dispatched via [`CommandDispatcher`], which routes CLI
//! subcommands to their implementations. Commands that need the crew
//! config load it through [`load_project_config`], so missing files,
//! parse errors and validation failures are reported the same way
//! everywhere.

pub mod check;
pub mod completions;
pub mod dispatcher;
pub mod plot;
pub mod run;
pub mod schema;

pub use dispatcher::{Command, CommandDispatcher, CommandResult};

use std::path::Path;

use crate::config::{load_config, validate_config, StepflowConfig};
use crate::error::FlowError;
use crate::ui::{OutputMode, UserInterface};

/// Outcome of loading the project config for a command.
#[derive(Debug)]
pub enum ProjectConfig {
    /// Config loaded and passed validation.
    Loaded(Box<StepflowConfig>),
    /// Problems were already reported on the UI; exit with this result.
    Reported(CommandResult),
}

/// Load and validate the config for a command.
///
/// A missing `stepflow.yml` exits with code 2; parse and validation
/// errors exit with code 1. When no verbosity flag was given, the
/// config's `default_output` becomes the UI mode.
pub fn load_project_config(
    project_root: &Path,
    config_override: Option<&Path>,
    ui: &mut dyn UserInterface,
) -> crate::error::Result<ProjectConfig> {
    let config = match load_config(project_root, config_override) {
        Ok(config) => config,
        Err(FlowError::ConfigNotFound { path }) => {
            ui.error(&format!("No configuration found at {}", path.display()));
            return Ok(ProjectConfig::Reported(CommandResult::failure(2)));
        }
        Err(FlowError::ConfigParseError { path, message }) => {
            ui.error(&format!("Parse error in {}: {}", path.display(), message));
            return Ok(ProjectConfig::Reported(CommandResult::failure(1)));
        }
        Err(e) => return Err(e),
    };

    if ui.output_mode() == OutputMode::Normal {
        ui.set_output_mode(config.settings.default_output.into());
    }

    let errors = validate_config(&config);
    if !errors.is_empty() {
        for error in &errors {
            ui.error(&format!("[{}] {}", error.rule, error.message));
        }
        return Ok(ProjectConfig::Reported(CommandResult::failure(1)));
    }

    Ok(ProjectConfig::Loaded(Box::new(config)))
}
