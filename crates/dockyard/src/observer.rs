//! Hooks for watching a pipeline run.
//!
//! The pipeline works the same with or without an observer attached; events
//! are informational only.

use std::path::Path;

use dockyard_build::RecipeStatus;
use dockyard_engine::{Acquisition, StoppedContainer};

use crate::report::{PublishedImage, RunWarning};
use crate::state::PipelineState;

#[derive(Debug, Clone, Copy)]
pub enum StageEvent<'a> {
    StateChanged(PipelineState),
    SourceAcquired {
        path: &'a Path,
        acquisition: Acquisition,
    },
    /// Files tracked in the checkout, as listed by git.
    SourceListed {
        files: &'a [String],
    },
    RecipeVerified {
        service: &'a str,
        status: RecipeStatus,
    },
    ImagePublished(&'a PublishedImage),
    RunWarning(&'a RunWarning),
    ContainerStopped(&'a StoppedContainer),
    Launched {
        manifest: &'a Path,
    },
    Aborted {
        reached: PipelineState,
        error: &'a str,
    },
}

pub trait StageObserver: Send + Sync {
    fn on_event(&self, event: &StageEvent<'_>);
}
