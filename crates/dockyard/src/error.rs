use dockyard_build::{ComposeError, RecipeError};
use dockyard_engine::{
    BuildError, CloneError, ComposeUpError, LoginError, PortReconcileError, PushError,
};

use crate::state::PipelineState;

/// A fatal pipeline failure.
///
/// The underlying tool error, stderr included, stays reachable through
/// [`std::error::Error::source`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to acquire source from {url}")]
    Acquisition { url: String, source: CloneError },

    #[error("recipe verification failed for {} service(s):{}", .failures.len(), list_recipe_failures(.failures))]
    Recipe { failures: Vec<(String, RecipeError)> },

    #[error("registry credentials are not configured")]
    Credentials { source: dockyard_core::Error },

    #[error("registry authentication failed for user '{user}'")]
    Authentication { user: String, source: LoginError },

    #[error("build failed for service '{service}'")]
    Build { service: String, source: BuildError },

    #[error("publish failed for service '{service}' ({image})")]
    Publish {
        service: String,
        image: String,
        source: PushError,
    },

    #[error("failed to free ports for the stack")]
    PortReconcile(#[from] PortReconcileError),

    #[error("failed to emit compose manifest")]
    Manifest(#[from] ComposeError),

    #[error("failed to launch the stack")]
    Orchestration { source: ComposeUpError },
}

fn list_recipe_failures(failures: &[(String, RecipeError)]) -> String {
    let mut out = String::new();
    for (service, error) in failures {
        out.push_str(&format!("\n  {service}: {}", error_chain(error)));
    }
    out
}

/// Returned by [`Pipeline::run`](crate::Pipeline::run) when a stage fails.
#[derive(Debug, thiserror::Error)]
#[error("pipeline aborted after reaching '{reached}'")]
pub struct Aborted {
    /// Last state reached before the failure.
    pub reached: PipelineState,
    #[source]
    pub error: PipelineError,
}

/// `error: cause: cause` on one line.
pub(crate) fn error_chain(error: &dyn std::error::Error) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        out.push_str(&format!(": {cause}"));
        source = cause.source();
    }
    out
}
