use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// File name looked up in the working directory when no `--config` is given.
pub const CONFIG_FILE_NAME: &str = "dockyard.toml";

/// dockyard.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockyardConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub recipe: RecipeConfig,
    #[serde(default)]
    pub compose: ComposeConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Repository to clone (overridden by `DOCKYARD_REPO_URL`)
    pub url: Option<String>,
    /// Branch or tag to check out on clone (overridden by `DOCKYARD_BRANCH`)
    pub branch: Option<String>,
    /// Local working copy (overridden by `DOCKYARD_CLONE_PATH`)
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry account (overridden by `DOCKYARD_REGISTRY_USER`)
    pub user: Option<String>,
    /// Prefix joined to each service name: `{user}/{prefix}-{name}`
    #[serde(default)]
    pub image_prefix: String,
    /// Tag applied to derived image references
    #[serde(default = "default_tag")]
    pub tag: String,
}

/// What to do when a service has no build recipe on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipePolicy {
    /// Write a placeholder recipe from the template and keep going.
    #[default]
    Synthesize,
    /// Fail the run with a clear message.
    Require,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeConfig {
    #[serde(default)]
    pub policy: RecipePolicy,
    /// Base runtime image of synthesized recipes
    #[serde(default = "default_recipe_base_image")]
    pub base_image: String,
    /// Dependency manifests copied ahead of the install step
    #[serde(default = "default_dependency_files")]
    pub dependency_files: Vec<String>,
    /// Dependency install step of synthesized recipes
    #[serde(default = "default_install_command")]
    pub install_command: String,
    /// Start command (exec form) of synthesized recipes
    #[serde(default = "default_start_command")]
    pub start_command: Vec<String>,
    /// Port exposed by synthesized recipes when the service declares none
    #[serde(default = "default_fallback_port")]
    pub fallback_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeConfig {
    /// Manifest file name, written into the source root
    #[serde(default = "default_compose_file")]
    pub file: String,
    /// Compose file format version
    #[serde(default = "default_compose_version")]
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Run log path, truncated at the start of every run
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    /// Upper bound for each external process, in seconds (0 disables)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts for registry login and image push (1 = no retry)
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

/// One `[[services]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    /// Build context relative to the source root (defaults to `name`)
    pub context: Option<PathBuf>,
    /// Full image reference; derived from the registry settings when omitted
    pub image: Option<String>,
    /// Host port published locally and in the manifest
    pub port: Option<u16>,
    /// Container-side port (defaults to `port`)
    pub container_port: Option<u16>,
    /// Start a local container after the build
    #[serde(default = "default_true")]
    pub run: bool,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            user: None,
            image_prefix: String::new(),
            tag: default_tag(),
        }
    }
}

impl Default for RecipeConfig {
    fn default() -> Self {
        Self {
            policy: RecipePolicy::default(),
            base_image: default_recipe_base_image(),
            dependency_files: default_dependency_files(),
            install_command: default_install_command(),
            start_command: default_start_command(),
            fallback_port: default_fallback_port(),
        }
    }
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            file: default_compose_file(),
            version: default_compose_version(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RunConfig {
    /// `None` when `timeout_secs` is 0.
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
        }
    }
}

impl DockyardConfig {
    /// Load from dockyard.toml in the given directory, or return defaults if not found.
    pub fn load(dir: &Path) -> crate::Result<Self> {
        Self::load_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Load from an explicit file path, or return defaults if it does not exist.
    pub fn load_file(config_path: &Path) -> crate::Result<Self> {
        if config_path.exists() {
            let content =
                std::fs::read_to_string(config_path).map_err(|e| crate::Error::ConfigLoad {
                    path: config_path.to_path_buf(),
                    source: e,
                })?;
            toml::from_str(&content).map_err(|e| crate::Error::ConfigParse {
                path: config_path.to_path_buf(),
                source: e,
            })
        } else {
            tracing::debug!(path = %config_path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }
}

fn default_tag() -> String {
    "latest".to_owned()
}

fn default_recipe_base_image() -> String {
    "python:3.11-slim".to_owned()
}

fn default_dependency_files() -> Vec<String> {
    vec!["requirements.txt".to_owned()]
}

fn default_install_command() -> String {
    "pip install --no-cache-dir -r requirements.txt".to_owned()
}

fn default_start_command() -> Vec<String> {
    vec!["python".to_owned(), "app.py".to_owned()]
}

fn default_fallback_port() -> u16 {
    8080
}

fn default_compose_file() -> String {
    "docker-compose.yml".to_owned()
}

fn default_compose_version() -> String {
    "3.8".to_owned()
}

fn default_log_file() -> PathBuf {
    PathBuf::from("dockyard.log")
}

fn default_timeout_secs() -> u64 {
    1800
}

fn default_attempts() -> u32 {
    1
}

fn default_true() -> bool {
    true
}
