//! The immutable per-run configuration.
//!
//! [`RunContext::resolve`] is the only place that consults the environment.
//! Everything downstream receives the already-resolved fields it needs.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::config::{ComposeConfig, DockyardConfig, RecipeConfig, ServiceConfig};
use crate::{Error, Result};

/// Environment variables consulted by [`RunContext::resolve`].
pub mod env_keys {
    pub const REGISTRY_USER: &str = "DOCKYARD_REGISTRY_USER";
    pub const REGISTRY_SECRET: &str = "DOCKYARD_REGISTRY_SECRET";
    pub const REPO_URL: &str = "DOCKYARD_REPO_URL";
    pub const BRANCH: &str = "DOCKYARD_BRANCH";
    pub const CLONE_PATH: &str = "DOCKYARD_CLONE_PATH";
}

/// Source of environment values.
///
/// The process environment in production, a plain map in tests.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Reads from `std::env`, treating empty values as unset.
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key)
            // arch-lint: allow(no-silent-result-drop) reason="an unset or non-UTF-8 variable means the setting is not provided"
            .ok()
            .filter(|v| !v.is_empty())
    }
}

/// Registry account used for `login` and `push`.
#[derive(Debug)]
pub struct RegistryCredentials {
    pub user: String,
    pub secret: SecretString,
}

/// One buildable unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    /// Unique key, also the hostname inside the composed stack
    pub name: String,
    /// Build context relative to the source root
    pub context: PathBuf,
    /// Registry-qualified image reference
    pub image: String,
    /// Host port, present only when the service exposes traffic
    pub port: Option<u16>,
    pub container_port: Option<u16>,
    pub run: bool,
    /// Manifest ordering only, never build ordering
    pub depends_on: Vec<String>,
    pub environment: BTreeMap<String, String>,
}

impl ServiceSpec {
    /// Host-to-container mapping, e.g. `"5001:5001"`.
    pub fn port_mapping(&self) -> Option<String> {
        self.port.map(|host| {
            let container = self.container_port.unwrap_or(host);
            format!("{host}:{container}")
        })
    }

    /// Whether the builder starts a local container after building.
    pub fn runs_locally(&self) -> bool {
        self.run && self.port.is_some()
    }
}

#[derive(Debug)]
pub struct RunContext {
    /// `None` until the registry secret is provided; only publishing needs it.
    pub credentials: Option<RegistryCredentials>,
    pub repository_url: String,
    pub branch: Option<String>,
    pub clone_path: PathBuf,
    pub services: Vec<ServiceSpec>,
    pub recipe: RecipeConfig,
    pub compose: ComposeConfig,
    pub log_file: PathBuf,
    pub timeout: Option<Duration>,
    pub retry_attempts: u32,
}

impl RunContext {
    /// Resolve the run configuration from the config file and environment.
    ///
    /// Environment values take precedence over the file. The registry
    /// secret is read from the environment only.
    pub fn resolve(config: DockyardConfig, env: &impl EnvSource) -> Result<Self> {
        let repository_url = env
            .var(env_keys::REPO_URL)
            .or(config.source.url)
            .ok_or(Error::MissingSetting {
                field: "source repository URL",
                hint: "[source].url in dockyard.toml or DOCKYARD_REPO_URL",
            })?;

        let branch = env.var(env_keys::BRANCH).or(config.source.branch);

        let clone_path = env
            .var(env_keys::CLONE_PATH)
            .map(PathBuf::from)
            .or(config.source.path)
            .unwrap_or_else(|| default_clone_path(&repository_url));

        let registry_user = env.var(env_keys::REGISTRY_USER).or(config.registry.user);

        let credentials = match (&registry_user, env.var(env_keys::REGISTRY_SECRET)) {
            (Some(user), Some(secret)) => Some(RegistryCredentials {
                user: user.clone(),
                secret: SecretString::from(secret),
            }),
            _ => None,
        };

        let services = resolve_services(
            config.services,
            registry_user.as_deref(),
            &config.registry.image_prefix,
            &config.registry.tag,
        )?;

        let timeout = config.run.timeout();

        Ok(Self {
            credentials,
            repository_url,
            branch,
            clone_path,
            services,
            recipe: config.recipe,
            compose: config.compose,
            log_file: config.run.log_file,
            timeout,
            retry_attempts: config.retry.attempts.max(1),
        })
    }

    /// Credentials for login/push, or an error naming what is missing.
    pub fn require_credentials(&self) -> Result<&RegistryCredentials> {
        self.credentials.as_ref().ok_or(Error::MissingSetting {
            field: "registry credentials",
            hint: "DOCKYARD_REGISTRY_USER and DOCKYARD_REGISTRY_SECRET",
        })
    }

    /// Root of the cloned source tree.
    pub fn source_root(&self) -> &Path {
        &self.clone_path
    }

    /// Where the compose manifest is written.
    pub fn compose_path(&self) -> PathBuf {
        self.clone_path.join(&self.compose.file)
    }

    /// Every host port the composed stack publishes.
    pub fn published_ports(&self) -> BTreeSet<u16> {
        self.services.iter().filter_map(|s| s.port).collect()
    }
}

/// `https://github.com/acme/shop.git` → `shop`
fn default_clone_path(repository_url: &str) -> PathBuf {
    let name = repository_url
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(repository_url);
    let name = name.strip_suffix(".git").unwrap_or(name);
    if name.is_empty() {
        PathBuf::from("source")
    } else {
        PathBuf::from(name)
    }
}

fn resolve_services(
    configs: Vec<ServiceConfig>,
    registry_user: Option<&str>,
    prefix: &str,
    tag: &str,
) -> Result<Vec<ServiceSpec>> {
    if configs.is_empty() {
        return Err(Error::NoServices);
    }

    let mut seen = HashSet::new();
    for svc in &configs {
        if svc.name.trim().is_empty() {
            return Err(Error::EmptyServiceName);
        }
        if !seen.insert(svc.name.as_str()) {
            return Err(Error::DuplicateService(svc.name.clone()));
        }
    }

    for svc in &configs {
        for dep in &svc.depends_on {
            if dep == &svc.name {
                return Err(Error::SelfDependency(svc.name.clone()));
            }
            if !seen.contains(dep.as_str()) {
                return Err(Error::UnknownDependency {
                    service: svc.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    configs
        .into_iter()
        .map(|svc| {
            let context = svc.context.unwrap_or_else(|| PathBuf::from(&svc.name));
            if escapes_root(&context) {
                return Err(Error::ContextOutsideRoot {
                    service: svc.name,
                    path: context,
                });
            }

            let image = match svc.image {
                Some(image) => image,
                None => {
                    let user = registry_user.ok_or(Error::MissingSetting {
                        field: "registry user",
                        hint: "[registry].user in dockyard.toml, DOCKYARD_REGISTRY_USER, or an explicit image per service",
                    })?;
                    derive_image(user, prefix, &svc.name, tag)
                }
            };

            Ok(ServiceSpec {
                name: svc.name,
                context,
                image,
                port: svc.port,
                container_port: svc.container_port,
                run: svc.run,
                depends_on: svc.depends_on,
                environment: svc.environment,
            })
        })
        .collect()
}

/// `{user}/{prefix}-{name}:{tag}`, or `{user}/{name}:{tag}` without a prefix.
pub fn derive_image(user: &str, prefix: &str, name: &str, tag: &str) -> String {
    if prefix.is_empty() {
        format!("{user}/{name}:{tag}")
    } else {
        format!("{user}/{prefix}-{name}:{tag}")
    }
}

/// Absolute paths and `..` components could point a build outside the clone.
fn escapes_root(context: &Path) -> bool {
    context
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
}
