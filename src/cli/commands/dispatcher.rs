//! Subcommand routing.
//!
//! Every subcommand is a [`Command`]; the [`CommandDispatcher`] builds the
//! one named on the command line and runs it against the project root.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::cli::args::{CheckArgs, Cli, Commands};
use crate::error::Result;
use crate::ui::UserInterface;

/// A CLI subcommand.
pub trait Command {
    /// Run the command, reporting through `ui`.
    ///
    /// Problems the user can fix (missing config, failed steps) are reported
    /// on the UI and returned as a failed [`CommandResult`]; `Err` is kept
    /// for I/O and other unexpected failures.
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult>;
}

/// Outcome of a command: 0 on success, 1 for failed runs or invalid
/// config, 2 when no config was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub exit_code: u8,
}

impl CommandResult {
    pub fn success() -> Self {
        Self {
            success: true,
            exit_code: 0,
        }
    }

    pub fn failure(exit_code: u8) -> Self {
        Self {
            success: false,
            exit_code,
        }
    }
}

impl From<CommandResult> for ExitCode {
    fn from(result: CommandResult) -> Self {
        ExitCode::from(result.exit_code)
    }
}

/// Dispatches CLI commands to their implementations.
pub struct CommandDispatcher {
    project_root: PathBuf,
    config_override: Option<PathBuf>,
}

impl CommandDispatcher {
    /// Create a new dispatcher for the given project root.
    pub fn new(project_root: PathBuf) -> Self {
        Self {
            project_root,
            config_override: None,
        }
    }

    /// Load this config file instead of discovering `stepflow.yml`.
    pub fn with_config(mut self, config: Option<PathBuf>) -> Self {
        self.config_override = config;
        self
    }

    /// Get the project root path.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Get the config override, if any.
    pub fn config_override(&self) -> Option<&Path> {
        self.config_override.as_deref()
    }

    /// Dispatch and execute a command.
    ///
    /// Routes the CLI subcommand to the appropriate command implementation
    /// and executes it.
    pub fn dispatch(&self, cli: &Cli, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let root = &self.project_root;
        let config = self.config_override();

        match &cli.command {
            Some(Commands::Check(args)) => {
                super::check::CheckCommand::new(root, config, args.clone()).execute(ui)
            }
            Some(Commands::Plot(args)) => {
                super::plot::PlotCommand::new(root, config, args.clone()).execute(ui)
            }
            Some(Commands::Run(args)) => {
                super::run::RunCommand::new(root, config, args.clone()).execute(ui)
            }
            Some(Commands::Schema) => super::schema::SchemaCommand::new().execute(ui),
            Some(Commands::Completions(args)) => {
                super::completions::CompletionsCommand::new(args.clone()).execute(ui)
            }
            None => super::check::CheckCommand::new(root, config, CheckArgs::default()).execute(ui),
        }
    }
}
