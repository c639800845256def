//! Configuration loading, parsing, and validation.
//!
//! - Schema definitions in [`schema`]
//! - File discovery and loading in [`loader`]
//! - Deep merging in [`merger`]
//! - Validation in [`validator`]
//! - `{name}` interpolation in [`interpolation`]
//!
//! # Example
//!
//! ```
//! use stepflow::config::{load_merged_config, validate};
//! use tempfile::TempDir;
//! use std::fs;
//!
//! let temp = TempDir::new().unwrap();
//! fs::write(
//!     temp.path().join("stepflow.yml"),
//!     "name: writer\nagents:\n  planner:\n    role: Planner\n    goal: Plan\n\
//!      tasks:\n  plan:\n    description: Plan {topic}\n    agent: planner\n",
//! )
//! .unwrap();
//!
//! let config = load_merged_config(temp.path()).unwrap();
//! validate(&config).unwrap();
//! assert_eq!(config.name, Some("writer".to_string()));
//! ```
//!
//! # Configuration File Locations
//!
//! Configuration is merged in this order:
//! 1. Project config (`stepflow.yml`)
//! 2. Local overrides (`stepflow.local.yml`)

pub mod interpolation;
pub mod loader;
pub mod merger;
pub mod schema;
pub mod validator;

pub use schema::{
    AgentConfig, OutputFormat, OutputMode, Settings, StepflowConfig, TaskConfig, TaskList,
};

pub use loader::{
    find_project_root, load_config, load_config_file, load_config_value, load_merged_config,
    parse_config, ConfigPaths, CONFIG_FILE, LOCAL_CONFIG_FILE,
};

pub use merger::{deep_merge, merge_configs};

pub use validator::{validate, validate_config, ValidationError};

pub use interpolation::{
    extract_variables, parse_interpolation, resolve_string, InterpolationContext, Segment,
};
