//! Tool configuration: tag keys and manually declared dependencies.

use std::collections::BTreeMap;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Template written by `init`
pub const CONFIG_TEMPLATE: &str = include_str!("config_template.yaml");

const USER_CONFIG_DIR: &str = ".config/cfn-infra-graph";
const CONFIG_FILE_NAME: &str = "config.yaml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    YamlError(#[from] serde_yaml::Error),
    #[error("No config found to load. Run the `init` command or provide a local config at {0}")]
    NotFound(Utf8PathBuf),
}

/// A downstream service consuming one of ours, owned by another team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualDependency {
    pub team: String,
    pub service: String,
}

/// An upstream service of ours that CloudFormation exports do not reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualInternalDependency {
    pub service: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    #[serde(default)]
    pub downstream_dependencies: BTreeMap<String, Vec<ManualDependency>>,
    #[serde(default)]
    pub internal_manual_dependencies: BTreeMap<String, Vec<ManualInternalDependency>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub default_project: String,
    /// Tag keys tried in order to resolve a stack's service
    #[serde(default = "default_service_tags")]
    pub service_tags: Vec<String>,
    /// Tag keys tried in order to resolve a stack's component
    #[serde(default = "default_component_tags")]
    pub component_tags: Vec<String>,
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectConfig>,
}

fn default_service_tags() -> Vec<String> {
    vec!["ServiceName".to_string(), "Service".to_string()]
}

fn default_component_tags() -> Vec<String> {
    vec!["Component".to_string()]
}

impl Config {
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    /// Manual dependencies of `project`; empty when the project is not configured.
    pub fn project(&self, project: &str) -> ProjectConfig {
        match self.projects.get(project) {
            Some(config) => config.clone(),
            None => {
                tracing::warn!(project, "project has no configuration, no manual dependencies used");
                ProjectConfig::default()
            }
        }
    }
}

/// Location of the per-user config, if a home directory is known.
pub fn user_config_path() -> Option<Utf8PathBuf> {
    dirs::home_dir().and_then(config_path_under)
}

/// The config path below `home`; `None` when it is not valid UTF-8.
fn config_path_under(home: PathBuf) -> Option<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(home.join(USER_CONFIG_DIR).join(CONFIG_FILE_NAME)).ok()
}

/// Pick the config to load: the local path if it exists, else the user config.
pub fn resolve_config_path(local: &Utf8Path, user: Option<&Utf8Path>) -> Result<Utf8PathBuf, ConfigError> {
    if local.exists() {
        tracing::info!(path = %local, "using local config");
        return Ok(local.to_owned());
    }
    match user {
        Some(user) if user.exists() => {
            tracing::info!(path = %user, "using user config");
            Ok(user.to_owned())
        }
        _ => Err(ConfigError::NotFound(local.to_owned())),
    }
}

pub fn load_config(local: &Utf8Path) -> Result<Config, ConfigError> {
    let path = resolve_config_path(local, user_config_path().as_deref())?;
    Config::from_file(&path)
}

/// Outcome of bootstrapping a config file.
#[derive(Debug, PartialEq, Eq)]
pub enum InitOutcome {
    Created(Utf8PathBuf),
    AlreadyExists(Utf8PathBuf),
}

/// Write the template to `target` unless a config is already there.
pub fn init_config(target: &Utf8Path) -> Result<InitOutcome, ConfigError> {
    if target.exists() {
        return Ok(InitOutcome::AlreadyExists(target.to_owned()));
    }
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(target, CONFIG_TEMPLATE)?;
    Ok(InitOutcome::Created(target.to_owned()))
}
