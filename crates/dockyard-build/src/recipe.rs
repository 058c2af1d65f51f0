use std::path::{Path, PathBuf};

use dockyard_core::{RecipeConfig, RecipePolicy, ServiceSpec};

/// Recipe file looked up in every build context.
pub const RECIPE_FILE_NAME: &str = "Dockerfile";

/// Outcome of verifying one service's build recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeStatus {
    /// The recipe was already on disk and was left untouched.
    Found,
    /// No recipe existed; a placeholder was written.
    Synthesized,
}

/// Renders the placeholder recipe written for services without one.
pub struct RecipeGenerator<'a> {
    config: &'a RecipeConfig,
    service: &'a str,
    port: u16,
}

impl<'a> RecipeGenerator<'a> {
    pub fn new(config: &'a RecipeConfig, service: &'a ServiceSpec) -> Self {
        let port = service
            .container_port
            .or(service.port)
            .unwrap_or(config.fallback_port);
        Self {
            config,
            service: &service.name,
            port,
        }
    }

    pub fn render(&self) -> String {
        let dependency_copy = if self.config.dependency_files.is_empty() {
            String::new()
        } else {
            format!("COPY {} ./\n", self.config.dependency_files.join(" "))
        };

        let install = if self.config.install_command.trim().is_empty() {
            String::new()
        } else {
            format!("RUN {}\n", self.config.install_command)
        };

        let cmd = self
            .config
            .start_command
            .iter()
            .map(|arg| format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\"")))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            r#"# Generated by dockyard: service '{service}' had no {file}.
# Base image, install step, and start command are placeholders.
FROM {base}
WORKDIR /app
{dependency_copy}{install}COPY . .
EXPOSE {port}
CMD [{cmd}]
"#,
            service = self.service,
            file = RECIPE_FILE_NAME,
            base = self.config.base_image,
            port = self.port,
        )
    }
}

/// Path of the recipe for `service` under `source_root`.
pub fn recipe_path(source_root: &Path, service: &ServiceSpec) -> PathBuf {
    source_root.join(&service.context).join(RECIPE_FILE_NAME)
}

/// Check that `service` has a build recipe, writing a placeholder when it
/// has none and the policy allows it.
///
/// An existing recipe is never read or rewritten.
pub fn verify_or_synthesize(
    source_root: &Path,
    service: &ServiceSpec,
    config: &RecipeConfig,
) -> Result<RecipeStatus, RecipeError> {
    let path = recipe_path(source_root, service);

    if path.is_file() {
        tracing::debug!(service = %service.name, path = %path.display(), "recipe found");
        return Ok(RecipeStatus::Found);
    }

    if config.policy == RecipePolicy::Require {
        return Err(RecipeError::Missing {
            service: service.name.clone(),
            path,
        });
    }

    let dir = source_root.join(&service.context);
    std::fs::create_dir_all(&dir).map_err(|e| RecipeError::CreateDir {
        path: dir.clone(),
        source: e,
    })?;

    let content = RecipeGenerator::new(config, service).render();
    std::fs::write(&path, content).map_err(|e| RecipeError::Write {
        path: path.clone(),
        source: e,
    })?;

    tracing::warn!(
        service = %service.name,
        path = %path.display(),
        "synthesized placeholder recipe; the image may not run"
    );
    Ok(RecipeStatus::Synthesized)
}

#[derive(Debug, thiserror::Error)]
pub enum RecipeError {
    #[error(
        "service '{service}' has no build recipe at {path} — add one, or set [recipe].policy = \"synthesize\""
    )]
    Missing { service: String, path: PathBuf },
    #[error("failed to create build context directory {path}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write recipe at {path}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}
