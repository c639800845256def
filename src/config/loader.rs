//! Configuration file discovery and loading.
//!
//! A project keeps its crew in `stepflow.yml` at the project root, with
//! optional personal overrides in `stepflow.local.yml` next to it.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::merger::merge_configs;
use crate::config::schema::StepflowConfig;
use crate::error::{FlowError, Result};

/// Project config file name.
pub const CONFIG_FILE: &str = "stepflow.yml";

/// Local override file name.
pub const LOCAL_CONFIG_FILE: &str = "stepflow.local.yml";

/// Paths to configuration files in merge order (later overrides earlier).
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Project config: stepflow.yml
    pub project: Option<PathBuf>,

    /// Local overrides: stepflow.local.yml
    pub project_local: Option<PathBuf>,
}

impl ConfigPaths {
    /// Discover config files for the given project root.
    pub fn discover(project_root: &Path) -> Self {
        Self {
            project: existing(project_root.join(CONFIG_FILE)),
            project_local: existing(project_root.join(LOCAL_CONFIG_FILE)),
        }
    }

    /// Returns all existing config paths in merge order.
    pub fn all_existing(&self) -> Vec<&PathBuf> {
        self.project.iter().chain(self.project_local.iter()).collect()
    }

    /// Check if the project config exists.
    pub fn has_project_config(&self) -> bool {
        self.project.is_some()
    }
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    path.is_file().then_some(path)
}

/// Find the project root by walking up from `start`.
///
/// The first directory containing `stepflow.yml` wins; a `.git` directory
/// is the fallback.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut git_root = None;

    for dir in start.ancestors() {
        if dir.join(CONFIG_FILE).is_file() {
            return Some(dir.to_path_buf());
        }
        if git_root.is_none() && dir.join(".git").exists() {
            git_root = Some(dir.to_path_buf());
        }
    }

    git_root
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            FlowError::ConfigNotFound {
                path: path.to_path_buf(),
            }
        } else {
            FlowError::Io(e)
        }
    })
}

/// Load a single config file.
///
/// # Errors
///
/// Returns `ConfigNotFound` if the file doesn't exist and
/// `ConfigParseError` if the YAML is invalid.
pub fn load_config_file(path: &Path) -> Result<StepflowConfig> {
    let content = read(path)?;
    parse_config(&content, path)
}

/// Parse YAML content into a config.
pub fn parse_config(content: &str, source_path: &Path) -> Result<StepflowConfig> {
    let value = parse_value(content, source_path)?;
    serde_yaml::from_value(value).map_err(|e| FlowError::ConfigParseError {
        path: source_path.to_path_buf(),
        message: e.to_string(),
    })
}

// An empty document is an empty mapping, so an empty override file changes
// nothing.
fn parse_value(content: &str, source_path: &Path) -> Result<serde_yaml::Value> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| FlowError::ConfigParseError {
            path: source_path.to_path_buf(),
            message: e.to_string(),
        })?;

    Ok(if value.is_null() {
        serde_yaml::Value::Mapping(Default::default())
    } else {
        value
    })
}

/// Load a config file as a raw YAML value (for merging).
pub fn load_config_value(path: &Path) -> Result<serde_yaml::Value> {
    let content = read(path)?;
    parse_value(&content, path)
}

/// Load and merge `stepflow.yml` and `stepflow.local.yml`.
///
/// # Errors
///
/// Returns `ConfigNotFound` if `stepflow.yml` does not exist.
pub fn load_merged_config(project_root: &Path) -> Result<StepflowConfig> {
    let paths = ConfigPaths::discover(project_root);
    let project_path = project_root.join(CONFIG_FILE);

    if !paths.has_project_config() {
        return Err(FlowError::ConfigNotFound { path: project_path });
    }

    let layers = paths
        .all_existing()
        .into_iter()
        .map(|path| load_config_value(path))
        .collect::<Result<Vec<_>>>()?;

    serde_yaml::from_value(merge_configs(&layers)).map_err(|e| FlowError::ConfigParseError {
        path: project_path,
        message: format!("Failed to parse merged config: {}", e),
    })
}

/// Load config with optional path override.
///
/// An override path is loaded on its own, without local overrides.
pub fn load_config(project_root: &Path, config_override: Option<&Path>) -> Result<StepflowConfig> {
    match config_override {
        Some(path) => load_config_file(path),
        None => load_merged_config(project_root),
    }
}
