//! Schema command implementation.
//!
//! The `stepflow schema` command prints the JSON schema of `stepflow.yml`,
//! for editor completion and validation.

use crate::config::StepflowConfig;
use crate::error::Result;
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandResult};

/// The schema command implementation.
#[derive(Debug, Default)]
pub struct SchemaCommand;

impl SchemaCommand {
    /// Create a new schema command.
    pub fn new() -> Self {
        Self
    }

    /// The schema as pretty-printed JSON.
    pub fn render() -> Result<String> {
        let schema = schemars::schema_for!(StepflowConfig);
        Ok(serde_json::to_string_pretty(&schema).map_err(anyhow::Error::from)?)
    }
}

impl Command for SchemaCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        ui.output(&Self::render()?);
        Ok(CommandResult::success())
    }
}
