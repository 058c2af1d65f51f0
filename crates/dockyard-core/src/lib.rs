//! Core types and configuration for dockyard.
//!
//! This crate defines the `dockyard.toml` schema ([`DockyardConfig`]),
//! the immutable per-run configuration ([`RunContext`] and its
//! [`ServiceSpec`] list), the append-only [`RunLog`], and shared error types.

pub mod config;
pub mod context;
pub mod error;
pub mod runlog;

pub use config::{
    CONFIG_FILE_NAME, ComposeConfig, DockyardConfig, RecipeConfig, RecipePolicy, RegistryConfig,
    RetryConfig, RunConfig, ServiceConfig, SourceConfig,
};
pub use context::{
    EnvSource, ProcessEnv, RegistryCredentials, RunContext, ServiceSpec, derive_image, env_keys,
};
pub use error::{Error, Result};
pub use runlog::{LogEntry, RunLog, Stage};
