use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use crate::tool::{Tool, ToolError};

/// One external-program call: program, typed argument list, working directory.
///
/// Arguments are passed straight to the process; no shell is involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub tool: Tool,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new<I, S>(tool: Tool, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tool,
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
        }
    }

    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    /// Whether `arg` is one of the arguments.
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// First argument, i.e. the subcommand (`build`, `push`, `clone`, ...).
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tool.program())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Abstraction over external-program execution for testability.
///
/// Production code uses [`RealExecutor`], tests use mockall-generated mocks.
#[allow(async_fn_in_trait)]
pub trait ToolExecutor: Send + Sync {
    /// Run to completion and capture stdout.
    async fn exec(&self, invocation: &Invocation) -> Result<String, ToolError>;

    /// Run to completion, streaming output to the terminal.
    async fn exec_streaming(&self, invocation: &Invocation) -> Result<(), ToolError>;

    /// Run with data piped to stdin and capture stdout.
    async fn exec_with_stdin(
        &self,
        invocation: &Invocation,
        stdin_data: &[u8],
    ) -> Result<String, ToolError>;
}

/// Runs the real programs, each call bounded by an optional timeout.
///
/// A call that outlives the timeout is killed and reported as
/// [`ToolError::TimedOut`].
#[derive(Debug, Clone, Default)]
pub struct RealExecutor {
    timeout: Option<Duration>,
}

impl RealExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    fn command(&self, invocation: &Invocation) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(invocation.tool.program());
        cmd.args(&invocation.args).kill_on_drop(true);
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }

    async fn bounded<T, F>(&self, invocation: &Invocation, fut: F) -> Result<T, ToolError>
    where
        F: Future<Output = std::io::Result<T>>,
    {
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(ToolError::TimedOut {
                        command: invocation.to_string(),
                        timeout: limit,
                    });
                }
            },
            None => fut.await,
        };
        result.map_err(|e| io_error(invocation, e))
    }
}

fn io_error(invocation: &Invocation, e: std::io::Error) -> ToolError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ToolError::NotFound {
            program: invocation.tool.program(),
            source: e,
        }
    } else {
        ToolError::Io {
            command: invocation.to_string(),
            source: e,
        }
    }
}

/// Stderr lines kept for the error of a failed streaming call.
const STDERR_TAIL_LINES: usize = 20;

/// Copy `stderr` to the terminal line by line, returning its last
/// [`STDERR_TAIL_LINES`] lines.
async fn tee_stderr<R>(stderr: R) -> std::io::Result<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    use tokio::io::AsyncBufReadExt;

    let mut lines = tokio::io::BufReader::new(stderr).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    while let Some(line) = lines.next_line().await? {
        eprintln!("{line}");
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Ok(Vec::from(tail).join("\n"))
}

fn captured(invocation: &Invocation, output: std::process::Output) -> Result<String, ToolError> {
    if output.status.success() {
        String::from_utf8(output.stdout).map_err(|e| ToolError::InvalidUtf8 {
            command: invocation.to_string(),
            source: e,
        })
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
        Err(ToolError::CommandFailed {
            command: invocation.to_string(),
            stderr,
        })
    }
}

impl ToolExecutor for RealExecutor {
    async fn exec(&self, invocation: &Invocation) -> Result<String, ToolError> {
        tracing::debug!(command = %invocation, "exec");

        let output = self
            .bounded(
                invocation,
                self.command(invocation)
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .output(),
            )
            .await?;

        captured(invocation, output)
    }

    async fn exec_streaming(&self, invocation: &Invocation) -> Result<(), ToolError> {
        tracing::debug!(command = %invocation, "exec (streaming)");

        let mut child = self
            .command(invocation)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| io_error(invocation, e))?;
        let stderr = child.stderr.take();

        let (status, tail) = self
            .bounded(invocation, async {
                let tail = match stderr {
                    Some(stderr) => tee_stderr(stderr).await?,
                    None => String::new(),
                };
                Ok::<_, std::io::Error>((child.wait().await?, tail))
            })
            .await?;

        if status.success() {
            Ok(())
        } else if tail.is_empty() {
            Err(ToolError::CommandFailed {
                command: invocation.to_string(),
                stderr: format!("exit code: {status}"),
            })
        } else {
            Err(ToolError::CommandFailed {
                command: invocation.to_string(),
                stderr: format!("{tail}\n(exit code: {status})"),
            })
        }
    }

    async fn exec_with_stdin(
        &self,
        invocation: &Invocation,
        stdin_data: &[u8],
    ) -> Result<String, ToolError> {
        use tokio::io::AsyncWriteExt;

        tracing::debug!(command = %invocation, "exec (stdin)");

        let mut child = self
            .command(invocation)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| io_error(invocation, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(stdin_data)
                .await
                .map_err(|e| ToolError::StdinWrite {
                    command: invocation.to_string(),
                    source: e,
                })?;
            stdin.shutdown().await.map_err(|e| ToolError::StdinWrite {
                command: invocation.to_string(),
                source: e,
            })?;
        }

        let output = self.bounded(invocation, child.wait_with_output()).await?;

        captured(invocation, output)
    }
}
