use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    // ── Run context resolution ──
    #[error("{field} is not set — set {hint}")]
    MissingSetting {
        field: &'static str,
        hint: &'static str,
    },

    #[error("no services configured — add at least one [[services]] entry to dockyard.toml")]
    NoServices,

    #[error("service name must not be empty")]
    EmptyServiceName,

    #[error("service '{0}' is declared more than once")]
    DuplicateService(String),

    #[error("service '{service}' depends on unknown service '{dependency}'")]
    UnknownDependency { service: String, dependency: String },

    #[error("service '{0}' depends on itself")]
    SelfDependency(String),

    #[error("service '{service}' has build context {path} outside the source root; use a relative path without '..'")]
    ContextOutsideRoot { service: String, path: PathBuf },

    // ── Run log ──
    #[error("failed to open run log at {path}")]
    RunLogOpen {
        path: PathBuf,
        source: std::io::Error,
    },
}
