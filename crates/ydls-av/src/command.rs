//! Builder for executing external tool commands with timeout support.
//!
//! Used for short-lived, fully captured invocations such as metadata
//! extraction. Long-running streaming engines are wired by the pipeline
//! crate instead.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;

/// Default command timeout: 60 seconds.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use ydls_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> ydls_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("yt-dlp"))
///     .arg("-J")
///     .arg("https://example.com/watch?v=1")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    /// Short name of the program for error messages.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Run the command and capture its output without judging the exit
    /// status, so callers can classify failures from stderr themselves.
    ///
    /// # Errors
    ///
    /// - Returns [`ydls_core::Error::Tool`] if spawning the process fails.
    /// - Returns [`ydls_core::Error::Tool`] if the process times out (message
    ///   includes the timeout duration). The child is killed.
    pub async fn output(&self) -> ydls_core::Result<ToolOutput> {
        self.try_output().await?.ok_or_else(|| {
            ydls_core::Error::tool(
                self.program_name(),
                format!("timed out after {:?}", self.timeout),
            )
        })
    }

    /// Like [`ToolCommand::output`], but reports a timeout as `Ok(None)` so
    /// callers can treat it differently from a spawn failure.
    pub async fn try_output(&self) -> ydls_core::Result<Option<ToolOutput>> {
        let program_name = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| ydls_core::Error::tool(&program_name, format!("failed to spawn: {e}")))?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(Some(ToolOutput {
                status: output.status,
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            })),
            Ok(Err(e)) => Err(ydls_core::Error::tool(
                program_name,
                format!("I/O error waiting for process: {e}"),
            )),
            // Dropping the wait future drops the child, which kills it.
            Err(_elapsed) => Ok(None),
        }
    }

    /// Execute the command, failing on a non-zero exit status.
    ///
    /// # Errors
    ///
    /// Everything [`ToolCommand::output`] returns, plus
    /// [`ydls_core::Error::Tool`] if the process exits with a non-zero status
    /// (message includes stderr).
    pub async fn execute(&self) -> ydls_core::Result<ToolOutput> {
        let output = self.output().await?;
        if !output.status.success() {
            return Err(ydls_core::Error::tool(
                self.program_name(),
                format!(
                    "exited with status {}: {}",
                    output.status,
                    output.stderr.trim()
                ),
            ));
        }
        Ok(output)
    }
}
