//! CLI argument definitions.
//!
//! This module defines all CLI arguments using clap's derive macros.
//! The main entry point is the [`Cli`] struct.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use crate::flow::GraphFormat;

/// Stepflow - declarative agent pipelines with routing and fan-in.
#[derive(Debug, Parser)]
#[command(name = "stepflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to config file (overrides stepflow.yml discovery)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to project root (overrides current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Show step outputs
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Validate the config and compile the crew (default if no command specified)
    Check(CheckArgs),

    /// Render the compiled pipeline as a graph
    Plot(PlotArgs),

    /// Dry-run the crew, answering every task with its rendered prompt
    Run(RunArgs),

    /// Print the JSON schema of stepflow.yml
    Schema,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the `check` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct CheckArgs {
    /// Print the compiled step definitions as JSON
    #[arg(long)]
    pub json: bool,
}

/// Graph formats accepted by `plot`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum PlotFormat {
    /// Graphviz DOT
    #[default]
    Dot,
    /// Mermaid flowchart
    Mermaid,
}

impl From<PlotFormat> for GraphFormat {
    fn from(format: PlotFormat) -> Self {
        match format {
            PlotFormat::Dot => GraphFormat::Dot,
            PlotFormat::Mermaid => GraphFormat::Mermaid,
        }
    }
}

/// Arguments for the `plot` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct PlotArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = PlotFormat::Dot)]
    pub format: PlotFormat,

    /// Write the graph to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the `run` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct RunArgs {
    /// Run input as key=value (repeatable; overrides config inputs)
    #[arg(short, long = "input", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub inputs: Vec<(String, String)>,

    /// Run once per object in a JSON array file
    #[arg(long, value_name = "FILE")]
    pub for_each: Option<PathBuf>,

    /// Print the execution record and output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `completions` command.
#[derive(Debug, Clone, clap::Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}
