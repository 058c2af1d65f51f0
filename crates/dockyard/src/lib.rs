//! Clone, build, publish, and launch a multi-service container stack.
//!
//! This crate drives the [`Pipeline`] and re-exports the dockyard sub-crates.
//!
//! ```text
//! acquire_source ─► verify_recipes ─► authenticate ─► {build ─► [run] ─► push} × N ─► launch
//!                                                                                   │
//!                                                          free_ports ─► emit manifest ─► compose up
//! ```
//!
//! Each stage reads only what earlier stages left on disk or in the local
//! engine, so any stage can be re-run on its own.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use dockyard::{DockyardConfig, Pipeline, ProcessEnv, RunContext, RunLog};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DockyardConfig::load(Path::new("."))?;
//! let ctx = RunContext::resolve(config, &ProcessEnv)?;
//! let log = RunLog::create(&ctx.log_file)?;
//! let report = Pipeline::new(&ctx, &log).run().await?;
//! println!("published {} image(s)", report.images.len());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod observer;
pub mod pipeline;
pub mod report;
pub mod state;

// Core types flattened into root namespace for convenience.
pub use dockyard_core::*;

pub use error::{Aborted, PipelineError};
pub use observer::{StageEvent, StageObserver};
pub use pipeline::Pipeline;
pub use report::{LaunchOutcome, PipelineReport, PublishOutcome, PublishedImage, RunWarning};
pub use state::PipelineState;

/// Recipe verification and compose manifest generation.
pub mod build {
    pub use dockyard_build::*;
}

/// git, docker, and docker-compose operations.
pub mod engine {
    pub use dockyard_engine::*;
}
