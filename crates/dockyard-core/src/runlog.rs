//! Append-only, human-readable log of a pipeline run.
//!
//! A full pipeline run truncates the file ([`RunLog::create`]); re-running a
//! single stage continues it ([`RunLog::append`]). Every entry is one
//! `[timestamp] message` line, mirrored to stdout.
//! Writes go through a mutex so concurrent callers never interleave a line.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Pipeline component that emitted an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Pipeline,
    Source,
    Recipe,
    Auth,
    Build,
    Run,
    Push,
    Ports,
    Compose,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Pipeline => "pipeline",
            Stage::Source => "source",
            Stage::Recipe => "recipe",
            Stage::Auth => "auth",
            Stage::Build => "build",
            Stage::Run => "run",
            Stage::Push => "push",
            Stage::Ports => "ports",
            Stage::Compose => "compose",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub stage: Stage,
    pub message: String,
}

impl LogEntry {
    /// The line as written to the log file, without the trailing newline.
    pub fn line(&self) -> String {
        format!(
            "[{}] {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.message
        )
    }
}

struct Inner {
    /// `None` for a console-only log.
    file: Option<File>,
    last: Option<DateTime<Local>>,
}

pub struct RunLog {
    path: Option<PathBuf>,
    echo: bool,
    inner: Mutex<Inner>,
}

impl RunLog {
    /// Start a fresh run log at `path`, truncating any previous contents.
    pub fn create(path: &Path) -> crate::Result<Self> {
        Self::open(path, OpenOptions::new().write(true).create(true).truncate(true))
    }

    /// Continue the run log at `path`, keeping earlier entries.
    pub fn append(path: &Path) -> crate::Result<Self> {
        Self::open(path, OpenOptions::new().append(true).create(true))
    }

    fn open(path: &Path, options: &OpenOptions) -> crate::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| crate::Error::RunLogOpen {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let file = options.open(path).map_err(|e| crate::Error::RunLogOpen {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(Self {
            path: Some(path.to_path_buf()),
            echo: true,
            inner: Mutex::new(Inner {
                file: Some(file),
                last: None,
            }),
        })
    }

    /// A log that only mirrors to the console.
    pub fn console() -> Self {
        Self {
            path: None,
            echo: true,
            inner: Mutex::new(Inner {
                file: None,
                last: None,
            }),
        }
    }

    /// Disable the stdout mirror (the file is still written).
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one entry.
    ///
    /// A failed append is reported through `tracing` and does not abort the
    /// caller: nothing in the pipeline reads the log back.
    pub fn log(&self, stage: Stage, message: impl Into<String>) -> LogEntry {
        let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        // Timestamps never go backwards within a run, even if the wall clock does.
        let now = Local::now();
        let timestamp = match inner.last {
            Some(last) if last > now => last,
            _ => now,
        };
        inner.last = Some(timestamp);

        let entry = LogEntry {
            timestamp,
            stage,
            message: message.into(),
        };
        let line = entry.line();

        if let Some(file) = inner.file.as_mut() {
            // arch-lint: allow(no-error-swallowing) reason="the run log is write-only; a failed append must not abort the run"
            if let Err(e) = writeln!(file, "{line}").and_then(|()| file.flush()) {
                tracing::warn!(error = %e, "failed to append to run log");
            }
        }

        if self.echo {
            println!("{line}");
        }
        tracing::debug!(stage = %stage, "{}", entry.message);

        entry
    }

    /// Append a warning entry; the message is prefixed with `WARNING:`.
    pub fn warn(&self, stage: Stage, message: impl fmt::Display) -> LogEntry {
        self.log(stage, format!("WARNING: {message}"))
    }
}

impl fmt::Debug for RunLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLog")
            .field("path", &self.path)
            .field("echo", &self.echo)
            .finish()
    }
}
