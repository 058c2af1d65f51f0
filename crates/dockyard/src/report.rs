use std::fmt;
use std::path::PathBuf;

use dockyard_build::RecipeStatus;
use dockyard_engine::{Acquisition, StoppedContainer};

use crate::state::PipelineState;

/// One service whose image was built and pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedImage {
    pub service: String,
    pub image: String,
    /// ID of the locally started container, if one was started
    pub container: Option<String>,
}

/// A local container that failed to start. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunWarning {
    pub service: String,
    pub image: String,
    pub message: String,
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "container for '{}' ({}) failed to start; continuing to push: {}",
            self.service, self.image, self.message
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct PublishOutcome {
    pub images: Vec<PublishedImage>,
    pub warnings: Vec<RunWarning>,
}

#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    pub stopped: Vec<StoppedContainer>,
    pub manifest: PathBuf,
}

/// Everything a successful run did.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub state: PipelineState,
    pub acquisition: Acquisition,
    pub recipes: Vec<(String, RecipeStatus)>,
    pub images: Vec<PublishedImage>,
    pub warnings: Vec<RunWarning>,
    pub stopped: Vec<StoppedContainer>,
    pub manifest: PathBuf,
}

impl PipelineReport {
    pub fn synthesized_recipes(&self) -> impl Iterator<Item = &str> {
        self.recipes
            .iter()
            .filter(|(_, status)| *status == RecipeStatus::Synthesized)
            .map(|(service, _)| service.as_str())
    }
}
