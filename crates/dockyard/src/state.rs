use std::fmt;

/// Furthest point a pipeline run has reached.
///
/// `Built`, `RunAttempted` and `Pushed` repeat once per service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineState {
    Start,
    SourceAcquired,
    RecipesVerified,
    Authenticated,
    Built,
    RunAttempted,
    Pushed,
    PortsFreed,
    ManifestEmitted,
    Launched,
    Done,
    Aborted,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Start => "start",
            PipelineState::SourceAcquired => "source acquired",
            PipelineState::RecipesVerified => "recipes verified",
            PipelineState::Authenticated => "authenticated",
            PipelineState::Built => "built",
            PipelineState::RunAttempted => "run attempted",
            PipelineState::Pushed => "pushed",
            PipelineState::PortsFreed => "ports freed",
            PipelineState::ManifestEmitted => "manifest emitted",
            PipelineState::Launched => "launched",
            PipelineState::Done => "done",
            PipelineState::Aborted => "aborted",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
