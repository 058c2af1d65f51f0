use std::fmt;
use std::time::Duration;

/// External programs the pipeline drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Git,
    Docker,
    Compose,
}

impl Tool {
    pub fn program(&self) -> &'static str {
        match self {
            Tool::Git => "git",
            Tool::Docker => "docker",
            Tool::Compose => "docker-compose",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{program} not found — is it installed and on PATH?")]
    NotFound {
        program: &'static str,
        source: std::io::Error,
    },

    #[error("failed to run `{command}`")]
    Io {
        command: String,
        source: std::io::Error,
    },

    #[error("`{command}` failed\n{stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("`{command}` timed out after {}s", timeout.as_secs())]
    TimedOut { command: String, timeout: Duration },

    #[error("`{command}` output was not valid UTF-8")]
    InvalidUtf8 {
        command: String,
        source: std::string::FromUtf8Error,
    },

    #[error("failed to write to stdin of `{command}`")]
    StdinWrite {
        command: String,
        source: std::io::Error,
    },
}

impl ToolError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ToolError::NotFound { .. })
    }
}
