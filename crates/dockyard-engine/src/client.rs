use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};

use crate::executor::{Invocation, RealExecutor, ToolExecutor};
use crate::ports::{self, RunningContainer};
use crate::tool::{Tool, ToolError};

/// git / docker / docker-compose operations, parameterized over the executor
/// for testability.
pub struct EngineClient<E: ToolExecutor = RealExecutor> {
    executor: E,
}

impl EngineClient<RealExecutor> {
    pub fn new() -> Self {
        Self {
            executor: RealExecutor::new(),
        }
    }
}

impl Default for EngineClient<RealExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ToolExecutor> EngineClient<E> {
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }

    // ── Source ──

    /// Clone `url` into `dest` unless `dest` already exists.
    ///
    /// An existing checkout is used as-is; it is never pulled or reset.
    pub async fn ensure_source(
        &self,
        url: &str,
        dest: &Path,
        branch: Option<&str>,
    ) -> Result<Acquisition, CloneError> {
        if dest.exists() {
            tracing::debug!(path = %dest.display(), "source already present");
            return Ok(Acquisition::AlreadyPresent);
        }

        self.clone_repository(url, dest, branch).await?;
        Ok(Acquisition::Cloned)
    }

    pub async fn clone_repository(
        &self,
        url: &str,
        dest: &Path,
        branch: Option<&str>,
    ) -> Result<(), CloneError> {
        let dest_str = path_arg(dest).map_err(CloneError::InvalidPath)?;

        let mut cmd = vec!["clone"];
        if let Some(branch) = branch {
            cmd.push("--branch");
            cmd.push(branch);
        }
        cmd.push(url);
        cmd.push(dest_str);

        self.executor
            .exec(&Invocation::new(Tool::Git, cmd))
            .await
            .map_err(|e| CloneError::Clone { source: e })?;

        Ok(())
    }

    /// Paths tracked in the checkout at `dir`, relative to its root.
    pub async fn list_files(&self, dir: &Path) -> Result<Vec<String>, ListFilesError> {
        let output = self
            .executor
            .exec(&Invocation::new(Tool::Git, ["ls-files", "-z"]).in_dir(dir))
            .await
            .map_err(|e| ListFilesError::List {
                path: dir.to_path_buf(),
                source: e,
            })?;

        Ok(output
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(str::to_owned)
            .collect())
    }

    // ── Registry ──

    /// `docker login`, with the secret piped on stdin rather than passed as an argument.
    pub async fn login(&self, user: &str, secret: &SecretString) -> Result<(), LoginError> {
        self.executor
            .exec_with_stdin(
                &Invocation::new(Tool::Docker, ["login", "-u", user, "--password-stdin"]),
                secret.expose_secret().as_bytes(),
            )
            .await
            .map_err(|e| LoginError::Rejected { source: e })?;

        Ok(())
    }

    pub async fn push_image(&self, image: &str) -> Result<(), PushError> {
        self.executor
            .exec(&Invocation::new(Tool::Docker, ["push", image]))
            .await
            .map_err(|e| PushError::Push { source: e })?;

        Ok(())
    }

    // ── Images and containers ──

    /// `docker build -t <image> <context>`.
    ///
    /// `capture`: when `true`, build output is captured and returned.
    ///            when `false`, output is streamed to the terminal.
    pub async fn build_image(
        &self,
        image: &str,
        context: &Path,
        capture: bool,
    ) -> Result<Option<String>, BuildError> {
        let context_str = path_arg(context).map_err(BuildError::InvalidPath)?;
        let invocation = Invocation::new(Tool::Docker, ["build", "-t", image, context_str]);

        if capture {
            self.executor
                .exec(&invocation)
                .await
                .map(Some)
                .map_err(|e| BuildError::Build { source: e })
        } else {
            self.executor
                .exec_streaming(&invocation)
                .await
                .map(|()| None)
                .map_err(|e| BuildError::Build { source: e })
        }
    }

    /// Start a detached container; returns its ID.
    pub async fn run_container(&self, image: &str, port_mapping: &str) -> Result<String, RunError> {
        let output = self
            .executor
            .exec(&Invocation::new(
                Tool::Docker,
                ["run", "-d", "-p", port_mapping, image],
            ))
            .await
            .map_err(|e| RunError::Run { source: e })?;

        Ok(output.trim().to_owned())
    }

    pub async fn list_running(&self) -> Result<Vec<RunningContainer>, ListError> {
        let output = self
            .executor
            .exec(&Invocation::new(
                Tool::Docker,
                ["ps", "--format", ports::PS_FORMAT],
            ))
            .await
            .map_err(|e| ListError::List { source: e })?;

        Ok(ports::parse_ps_output(&output))
    }

    pub async fn stop_container(&self, id: &str) -> Result<(), StopError> {
        self.executor
            .exec(&Invocation::new(Tool::Docker, ["stop", id]))
            .await
            .map_err(|e| StopError::Stop {
                id: id.to_owned(),
                source: e,
            })?;

        Ok(())
    }

    /// Stop every running container that publishes one of `requested` on the host.
    ///
    /// Containers are stopped whole; unrelated ports they publish go down too.
    pub async fn free_ports(
        &self,
        requested: &BTreeSet<u16>,
    ) -> Result<Vec<StoppedContainer>, PortReconcileError> {
        if requested.is_empty() {
            return Ok(Vec::new());
        }

        let running = self.list_running().await?;
        let mut stopped = Vec::new();

        for container in running {
            let Some(port) = container.conflicting_port(requested) else {
                continue;
            };
            tracing::info!(container = %container.id, port, "stopping container holding port");
            self.stop_container(&container.id).await?;
            stopped.push(StoppedContainer {
                id: container.id,
                port,
            });
        }

        Ok(stopped)
    }

    // ── Compose ──

    /// `docker-compose -f <manifest> up -d`, run in the manifest's directory.
    ///
    /// Falls back to the `docker compose` plugin when the standalone
    /// binary is not installed.
    pub async fn compose_up(
        &self,
        manifest: &Path,
        capture: bool,
    ) -> Result<Option<String>, ComposeUpError> {
        let dir = manifest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let file = manifest
            .file_name()
            .and_then(|f| f.to_str())
            .ok_or_else(|| ComposeUpError::InvalidManifest(manifest.to_path_buf()))?;

        let standalone = Invocation::new(Tool::Compose, ["-f", file, "up", "-d"]).in_dir(dir);

        match self.run_compose(&standalone, capture).await {
            Err(e) if e.is_not_found() => {
                tracing::debug!("docker-compose not found, trying `docker compose`");
                let plugin =
                    Invocation::new(Tool::Docker, ["compose", "-f", file, "up", "-d"]).in_dir(dir);
                self.run_compose(&plugin, capture)
                    .await
                    .map_err(|e| ComposeUpError::Up { source: e })
            }
            other => other.map_err(|e| ComposeUpError::Up { source: e }),
        }
    }

    async fn run_compose(
        &self,
        invocation: &Invocation,
        capture: bool,
    ) -> Result<Option<String>, ToolError> {
        if capture {
            self.executor.exec(invocation).await.map(Some)
        } else {
            self.executor.exec_streaming(invocation).await.map(|()| None)
        }
    }

    // ── Doctor ──

    /// Run all tool checks without early return.
    pub async fn doctor(&self) -> DoctorReport {
        let mut report = DoctorReport::default();

        match self
            .executor
            .exec(&Invocation::new(Tool::Git, ["--version"]))
            .await
        {
            Ok(v) => {
                let version = v.trim().strip_prefix("git version ").unwrap_or(v.trim());
                report.git = CheckResult::ok(version);
            }
            Err(e) => report.git = CheckResult::fail(&e.to_string()),
        }

        match self
            .executor
            .exec(&Invocation::new(
                Tool::Docker,
                ["version", "--format", "{{.Server.Version}}"],
            ))
            .await
        {
            Ok(v) if !v.trim().is_empty() => report.docker = CheckResult::ok(v.trim()),
            Ok(_) => report.docker = CheckResult::fail("docker daemon not reachable"),
            Err(e) => report.docker = CheckResult::fail(&e.to_string()),
        }

        match self
            .executor
            .exec(&Invocation::new(Tool::Compose, ["version", "--short"]))
            .await
        {
            Ok(v) => report.compose = CheckResult::ok(v.trim()),
            Err(_) => {
                match self
                    .executor
                    .exec(&Invocation::new(
                        Tool::Docker,
                        ["compose", "version", "--short"],
                    ))
                    .await
                {
                    Ok(v) => {
                        report.compose = CheckResult::ok(&format!("{} (plugin)", v.trim()));
                    }
                    Err(e) => report.compose = CheckResult::fail(&e.to_string()),
                }
            }
        }

        report
    }
}

// ── Helper ──

fn path_arg(path: &Path) -> Result<&str, PathBuf> {
    path.to_str().ok_or_else(|| path.to_path_buf())
}

// ── Result types ──

/// Outcome of [`EngineClient::ensure_source`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    Cloned,
    AlreadyPresent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoppedContainer {
    pub id: String,
    /// The requested port that made this container a conflict
    pub port: u16,
}

// ── Doctor types ──

#[derive(Debug, Default)]
pub struct DoctorReport {
    pub git: CheckResult,
    pub docker: CheckResult,
    pub compose: CheckResult,
    pub config_file: CheckResult,
}

impl DoctorReport {
    pub fn all_passed(&self) -> bool {
        self.git.passed && self.docker.passed && self.compose.passed && self.config_file.passed
    }
}

impl fmt::Display for DoctorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = [
            ("git", &self.git),
            ("docker", &self.docker),
            ("docker-compose", &self.compose),
            ("dockyard.toml", &self.config_file),
        ];
        for (label, check) in rows {
            writeln!(f, "  [{}] {label:<16} {}", check.icon(), check.detail)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    pub fn ok(detail: &str) -> Self {
        Self {
            passed: true,
            detail: detail.to_owned(),
        }
    }

    pub fn fail(detail: &str) -> Self {
        Self {
            passed: false,
            detail: detail.to_owned(),
        }
    }

    pub fn icon(&self) -> &'static str {
        if self.passed { "OK" } else { "NG" }
    }
}

// ── Error types ──

#[derive(Debug, thiserror::Error)]
pub enum CloneError {
    #[error("clone destination is not valid UTF-8: {0}")]
    InvalidPath(PathBuf),

    #[error("git clone failed")]
    Clone { source: ToolError },
}

#[derive(Debug, thiserror::Error)]
pub enum ListFilesError {
    #[error("failed to list files in {path}")]
    List { path: PathBuf, source: ToolError },
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("registry login rejected")]
    Rejected { source: ToolError },
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("build context is not valid UTF-8: {0}")]
    InvalidPath(PathBuf),

    #[error("image build failed")]
    Build { source: ToolError },
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("container failed to start")]
    Run { source: ToolError },
}

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("image push failed")]
    Push { source: ToolError },
}

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("failed to list running containers")]
    List { source: ToolError },
}

#[derive(Debug, thiserror::Error)]
pub enum StopError {
    #[error("failed to stop container {id}")]
    Stop { id: String, source: ToolError },
}

#[derive(Debug, thiserror::Error)]
pub enum PortReconcileError {
    #[error(transparent)]
    List(#[from] ListError),

    #[error(transparent)]
    Stop(#[from] StopError),
}

#[derive(Debug, thiserror::Error)]
pub enum ComposeUpError {
    #[error("compose manifest path has no valid UTF-8 file name: {0}")]
    InvalidManifest(PathBuf),

    #[error("compose up failed")]
    Up { source: ToolError },
}
